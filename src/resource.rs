//! Resource record data (rdata) parsing and serialisation.
//!
//! Each variant of [`crate::types::Resource`] is backed by a plain struct (or
//! a type alias over a built-in) with a cursor-based `parse` and a
//! `Write`-based `write`, mirroring the read/write split already used by
//! [`crate::io`] and [`crate::dns`].

use crate::errors::ParseError;
use crate::io::{DNSReadExt, DNSWriteExt};
use crate::parse_error;
use crate::types::{Class, Resource, Type};
use std::fmt;
use std::io::{self, Cursor, Read};
use std::net::{Ipv4Addr, Ipv6Addr};

pub type A = Ipv4Addr;
pub type AAAA = Ipv6Addr;
pub type CNAME = String;
pub type NS = String;
pub type PTR = String;

/// A TXT record's character-strings, still split on their length-prefixed
/// boundaries. [`crate::dnssd::txt`] layers RFC 1464 key=value parsing on
/// top of this.
pub type TXT = Vec<Vec<u8>>;

/// Mail exchange record (rfc1035 §3.3.9).
#[derive(Clone, Debug, PartialEq)]
pub struct MX {
    pub preference: u16,
    pub exchange: String,
}

impl fmt::Display for MX {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.preference, self.exchange)
    }
}

/// Start of authority record (rfc1035 §3.3.13).
#[derive(Clone, Debug, PartialEq)]
pub struct SOA {
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl fmt::Display for SOA {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.mname, self.rname, self.serial, self.refresh, self.retry, self.expire, self.minimum
        )
    }
}

/// Service location record (rfc2782).
#[derive(Clone, Debug, PartialEq)]
pub struct SRV {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

impl fmt::Display for SRV {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {} {}", self.priority, self.weight, self.port, self.target)
    }
}

/// Transaction signature record (rfc2845 §2).
#[derive(Clone, Debug, PartialEq)]
pub struct Tsig {
    /// Name of the signing algorithm, e.g. `hmac-sha256.`.
    pub algorithm_name: String,
    /// Seconds since the Unix epoch (48 bit on the wire).
    pub time_signed: u64,
    pub fudge: u16,
    pub mac: Vec<u8>,
    pub original_id: u16,
    pub error: u16,
    pub other_data: Vec<u8>,
}

impl fmt::Display for Tsig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.algorithm_name,
            self.time_signed,
            hex_string(&self.mac)
        )
    }
}

fn hex_string(buf: &[u8]) -> String {
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parses the rdata of a resource record of the given `type`/`class` out of
/// `rdata`, which must contain exactly the record's RDLENGTH bytes.
///
/// `message` is the full message buffer, needed because names inside rdata
/// (NS/CNAME/PTR/MX/SOA/SRV targets) may use compression pointers relative
/// to the start of the message rather than the start of the rdata.
pub fn parse_rdata(
    r#type: Type,
    class: Class,
    message: &[u8],
    rdata_start: usize,
    rdata_len: usize,
) -> Result<Resource, ParseError> {
    let rdata = match message.get(rdata_start..rdata_start + rdata_len) {
        Some(b) => b,
        None => return parse_error!("rdata of {} bytes runs past the end of the message", rdata_len),
    };

    match r#type {
        Type::A => {
            if class != Class::Internet {
                return parse_error!("unsupported class {} for an A record", class);
            }
            if rdata.len() != 4 {
                return parse_error!("invalid A record length {} (expected 4)", rdata.len());
            }
            Ok(Resource::A(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3])))
        }

        Type::AAAA => {
            if class != Class::Internet {
                return parse_error!("unsupported class {} for an AAAA record", class);
            }
            if rdata.len() != 16 {
                return parse_error!("invalid AAAA record length {} (expected 16)", rdata.len());
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(rdata);
            Ok(Resource::AAAA(Ipv6Addr::from(octets)))
        }

        Type::NS => Ok(Resource::NS(read_name_at(message, rdata_start)?)),
        Type::CNAME => Ok(Resource::CNAME(read_name_at(message, rdata_start)?)),
        Type::PTR => Ok(Resource::PTR(read_name_at(message, rdata_start)?)),

        Type::TXT => Ok(Resource::TXT(parse_txt(rdata)?)),

        Type::MX => {
            let mut cursor = Cursor::new(message);
            cursor.set_position(rdata_start as u64);
            let preference = byteorder::ReadBytesExt::read_u16::<byteorder::BE>(&mut cursor)
                .map_err(ParseError::from)?;
            let exchange = cursor.read_qname().map_err(ParseError::from)?;
            Ok(Resource::MX(MX { preference, exchange }))
        }

        Type::SOA => {
            let mut cursor = Cursor::new(message);
            cursor.set_position(rdata_start as u64);
            let mname = cursor.read_qname().map_err(ParseError::from)?;
            let rname = cursor.read_qname().map_err(ParseError::from)?;
            let serial = byteorder::ReadBytesExt::read_u32::<byteorder::BE>(&mut cursor).map_err(ParseError::from)?;
            let refresh = byteorder::ReadBytesExt::read_u32::<byteorder::BE>(&mut cursor).map_err(ParseError::from)?;
            let retry = byteorder::ReadBytesExt::read_u32::<byteorder::BE>(&mut cursor).map_err(ParseError::from)?;
            let expire = byteorder::ReadBytesExt::read_u32::<byteorder::BE>(&mut cursor).map_err(ParseError::from)?;
            let minimum = byteorder::ReadBytesExt::read_u32::<byteorder::BE>(&mut cursor).map_err(ParseError::from)?;
            Ok(Resource::SOA(SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            }))
        }

        Type::SRV => {
            if rdata.len() < 7 {
                return parse_error!("SRV record of {} bytes is too short", rdata.len());
            }
            let mut cursor = Cursor::new(message);
            cursor.set_position(rdata_start as u64);
            let priority = byteorder::ReadBytesExt::read_u16::<byteorder::BE>(&mut cursor).map_err(ParseError::from)?;
            let weight = byteorder::ReadBytesExt::read_u16::<byteorder::BE>(&mut cursor).map_err(ParseError::from)?;
            let port = byteorder::ReadBytesExt::read_u16::<byteorder::BE>(&mut cursor).map_err(ParseError::from)?;
            let target = cursor.read_qname().map_err(ParseError::from)?;
            Ok(Resource::SRV(SRV {
                priority,
                weight,
                port,
                target,
            }))
        }

        Type::TSIG => Ok(Resource::TSIG(parse_tsig(message, rdata_start)?)),

        Type::OPT => Ok(Resource::OPT),

        Type::ANY | Type::Reserved => parse_error!("{} is not a valid record type", r#type),
    }
}

fn read_name_at(message: &[u8], start: usize) -> Result<String, ParseError> {
    let mut cursor = Cursor::new(message);
    cursor.set_position(start as u64);
    Ok(cursor.read_qname()?)
}

fn parse_txt(rdata: &[u8]) -> Result<TXT, ParseError> {
    let mut strings = Vec::new();
    let mut offset = 0;

    while offset < rdata.len() {
        let len = rdata[offset] as usize;
        offset += 1;

        match rdata.get(offset..offset + len) {
            None => return parse_error!("TXT character-string runs past the end of the record"),
            Some(s) => strings.push(s.to_vec()),
        }

        offset += len;
    }

    Ok(strings)
}

fn parse_tsig(message: &[u8], start: usize) -> Result<Tsig, ParseError> {
    let mut cursor = Cursor::new(message);
    cursor.set_position(start as u64);

    let algorithm_name = cursor.read_qname()?;
    let time_signed = cursor.read_u48()?;
    let fudge = byteorder::ReadBytesExt::read_u16::<byteorder::BE>(&mut cursor).map_err(ParseError::from)?;

    let mac_size = byteorder::ReadBytesExt::read_u16::<byteorder::BE>(&mut cursor).map_err(ParseError::from)? as usize;
    let mut mac = vec![0u8; mac_size];
    cursor.read_exact(&mut mac).map_err(ParseError::from)?;

    let original_id = byteorder::ReadBytesExt::read_u16::<byteorder::BE>(&mut cursor).map_err(ParseError::from)?;
    let error = byteorder::ReadBytesExt::read_u16::<byteorder::BE>(&mut cursor).map_err(ParseError::from)?;

    let other_len = byteorder::ReadBytesExt::read_u16::<byteorder::BE>(&mut cursor).map_err(ParseError::from)? as usize;
    let mut other_data = vec![0u8; other_len];
    cursor.read_exact(&mut other_data).map_err(ParseError::from)?;

    Ok(Tsig {
        algorithm_name,
        time_signed,
        fudge,
        mac,
        original_id,
        error,
        other_data,
    })
}

/// Writes the rdata of `resource` (without the RDLENGTH prefix, which the
/// caller patches in after the fact since names are written uncompressed and
/// so have a length known only once written).
pub fn write_rdata<W: io::Write>(resource: &Resource, w: &mut W) -> io::Result<()> {
    use byteorder::{WriteBytesExt, BE};

    match resource {
        Resource::A(ip) => w.write_all(&ip.octets()),
        Resource::AAAA(ip) => w.write_all(&ip.octets()),
        Resource::CNAME(name) | Resource::NS(name) | Resource::PTR(name) => w.write_qname(name),

        Resource::TXT(strings) => {
            for s in strings {
                w.write_u8(s.len() as u8)?;
                w.write_all(s)?;
            }
            Ok(())
        }

        Resource::MX(mx) => {
            w.write_u16::<BE>(mx.preference)?;
            w.write_qname(&mx.exchange)
        }

        Resource::SOA(soa) => {
            w.write_qname(&soa.mname)?;
            w.write_qname(&soa.rname)?;
            w.write_u32::<BE>(soa.serial)?;
            w.write_u32::<BE>(soa.refresh)?;
            w.write_u32::<BE>(soa.retry)?;
            w.write_u32::<BE>(soa.expire)?;
            w.write_u32::<BE>(soa.minimum)
        }

        Resource::SRV(srv) => {
            w.write_u16::<BE>(srv.priority)?;
            w.write_u16::<BE>(srv.weight)?;
            w.write_u16::<BE>(srv.port)?;
            w.write_qname(&srv.target)
        }

        Resource::TSIG(tsig) => write_tsig(tsig, w),

        Resource::OPT => Ok(()),

        Resource::Unknown(_, bytes) => w.write_all(bytes),

        Resource::ANY => Ok(()),
    }
}

pub fn write_tsig<W: io::Write>(tsig: &Tsig, w: &mut W) -> io::Result<()> {
    use byteorder::{WriteBytesExt, BE};

    w.write_qname(&tsig.algorithm_name)?;
    w.write_u48(tsig.time_signed)?;
    w.write_u16::<BE>(tsig.fudge)?;
    w.write_u16::<BE>(tsig.mac.len() as u16)?;
    w.write_all(&tsig.mac)?;
    w.write_u16::<BE>(tsig.original_id)?;
    w.write_u16::<BE>(tsig.error)?;
    w.write_u16::<BE>(tsig.other_data.len() as u16)?;
    w.write_all(&tsig.other_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_record_round_trips() {
        let resource = Resource::A(Ipv4Addr::new(8, 8, 8, 8));
        let mut buf = Vec::new();
        write_rdata(&resource, &mut buf).unwrap();
        assert_eq!(buf, vec![8, 8, 8, 8]);

        let parsed = parse_rdata(Type::A, Class::Internet, &buf, 0, buf.len()).unwrap();
        assert_eq!(parsed, resource);
    }

    #[test]
    fn txt_splits_on_length_prefixes() {
        let rdata = b"\x05hello\x05world";
        let strings = parse_txt(rdata).unwrap();
        assert_eq!(strings, vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn tsig_round_trips_through_a_message_buffer() {
        let tsig = Tsig {
            algorithm_name: "hmac-sha256.".to_string(),
            time_signed: 1_700_000_000,
            fudge: 300,
            mac: vec![0xAB; 32],
            original_id: 42,
            error: 0,
            other_data: vec![],
        };

        let mut buf = Vec::new();
        write_tsig(&tsig, &mut buf).unwrap();

        let parsed = parse_tsig(&buf, 0).unwrap();
        assert_eq!(parsed, tsig);
    }
}
