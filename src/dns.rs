use crate::bail;
use crate::io::{DNSReadExt, DNSWriteExt, SeekExt};
use crate::resource::{parse_rdata, write_rdata};
use crate::types::*;
use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use num_traits::FromPrimitive;
use rand::Rng;
use std::io;
use std::io::Cursor;
use std::time::Duration;

#[derive(Copy, Clone, PartialEq)]
enum RecordSection {
    Answers,
    Authorities,
    Additionals,
}

/// A helper class to hold state while the parsing is happening.
pub(crate) struct MessageParser<'a> {
    cur: Cursor<&'a [u8]>,

    m: Message,
}

impl<'a> MessageParser<'a> {
    fn new(buf: &[u8]) -> MessageParser {
        MessageParser {
            cur: Cursor::new(buf),
            m: Message::default(),
        }
    }

    /// Consume the [`MessageParser`] and returned the resulting Message.
    fn parse(mut self) -> io::Result<Message> {
        self.m.id = self.cur.read_u16::<BE>()?;

        let b = self.cur.read_u8()?;
        self.m.qr = QR::from_bool(0b1000_0000 & b != 0);
        let opcode = (0b0111_1000 & b) >> 3;
        self.m.aa = (0b0000_0100 & b) != 0;
        self.m.tc = (0b0000_0010 & b) != 0;
        self.m.rd = (0b0000_0001 & b) != 0;

        self.m.opcode = match FromPrimitive::from_u8(opcode) {
            Some(t) => t,
            None => bail!(InvalidData, "invalid Opcode({})", opcode),
        };

        let b = self.cur.read_u8()?;
        self.m.ra = (0b1000_0000 & b) != 0;
        self.m.z = (0b0100_0000 & b) != 0; // Unused
        self.m.ad = (0b0010_0000 & b) != 0;
        self.m.cd = (0b0001_0000 & b) != 0;
        let rcode = 0b0000_1111 & b;

        self.m.rcode = match FromPrimitive::from_u8(rcode) {
            Some(t) => t,
            None => bail!(InvalidData, "invalid RCode({})", rcode),
        };

        let qd_count = self.cur.read_u16::<BE>()?;
        let an_count = self.cur.read_u16::<BE>()?;
        let ns_count = self.cur.read_u16::<BE>()?;
        let ar_count = self.cur.read_u16::<BE>()?;

        self.read_questions(qd_count)?;
        self.read_records(an_count, RecordSection::Answers)?;
        self.read_records(ns_count, RecordSection::Authorities)?;
        self.read_records(ar_count, RecordSection::Additionals)?;

        if self.cur.remaining()? > 0 {
            bail!(
                Other,
                "finished parsing with {} bytes left over",
                self.cur.remaining()?
            );
        }

        Ok(self.m)
    }

    fn read_questions(&mut self, count: u16) -> io::Result<()> {
        self.m.questions.reserve_exact(count.into());

        for _ in 0..count {
            let name = self.cur.read_qname()?;
            let r#type = self.cur.read_type()?;
            let class = self.cur.read_class()?;

            self.m.questions.push(Question {
                name,
                r#type,
                class,
            });
        }

        Ok(())
    }

    fn read_records(&mut self, count: u16, section: RecordSection) -> io::Result<()> {
        for _ in 0..count {
            let name = self.cur.read_qname()?;
            let type_code = self.cur.read_u16::<BE>()?;
            let r#type: Option<Type> = FromPrimitive::from_u16(type_code);

            // OPT repurposes the class/ttl wire positions as payload-size
            // and extended-rcode/version/flags, so it cannot be read through
            // the generic class-then-ttl-then-rdata path below.
            if section == RecordSection::Additionals && r#type == Some(Type::OPT) {
                if self.m.extension.is_some() {
                    bail!(
                        InvalidData,
                        "multiple EDNS(0) extensions. Expected only one."
                    );
                }

                self.m.extension = Some(Extension::parse(&mut self.cur, &name)?);
                continue;
            }

            let class = self.cur.read_class()?;
            let ttl = self.cur.read_u32::<BE>()?;
            let rdlength = self.cur.read_u16::<BE>()? as usize;

            let rdata_start = self.cur.position() as usize;
            let message = *self.cur.get_ref();

            // Unrecognised wire type codes fall through to an opaque
            // variant storing the raw rdata rather than failing the whole
            // message (§4.1 resource-data dispatch).
            let resource = match r#type {
                Some(r#type) => {
                    parse_rdata(r#type, class, message, rdata_start, rdlength).map_err(|e| match e {
                        crate::errors::ParseError::Io(e) => e,
                        crate::errors::ParseError::Message(msg) => {
                            io::Error::new(io::ErrorKind::InvalidData, msg)
                        }
                    })?
                }
                None => {
                    let rdata = match message.get(rdata_start..rdata_start + rdlength) {
                        Some(b) => b,
                        None => bail!(InvalidData, "rdata of {} bytes runs past the end of the message", rdlength),
                    };
                    Resource::Unknown(type_code, rdata.to_vec())
                }
            };

            self.cur
                .seek(io::SeekFrom::Start((rdata_start + rdlength) as u64))?;

            let record = Record {
                name,
                class,
                ttl: Duration::from_secs(ttl as u64),
                resource,
            };

            match section {
                RecordSection::Answers => self.m.answers.push(record),
                RecordSection::Authorities => self.m.authoritys.push(record),
                RecordSection::Additionals => self.m.additionals.push(record),
            }
        }

        Ok(())
    }
}

/// Defaults to a [`Message`] with sensible values for querying.
impl Default for Message {
    fn default() -> Self {
        Message {
            id: Message::random_id(),
            rd: true,
            tc: false,
            aa: false,
            opcode: Opcode::Query,
            qr: QR::Query,
            rcode: Rcode::NoError,
            cd: false,
            ad: true,
            z: false,
            ra: false,

            questions: Vec::default(),
            answers: Vec::default(),
            authoritys: Vec::default(),
            additionals: Vec::default(),
            extension: None,
            stats: None,
        }
    }
}

impl Message {
    /// Returns a random u16 suitable for the [`Message`] id field.
    ///
    /// Generated fresh per call via [`rand::thread_rng`]; unlike the source
    /// material there is no process-global counter for two [`Message`]s (or
    /// two resolvers in the same process) to race on.
    pub fn random_id() -> u16 {
        rand::thread_rng().gen()
    }

    /// Decodes the supplied buffer and returns a [`Message`].
    pub fn from_slice(buf: &[u8]) -> io::Result<Message> {
        MessageParser::new(buf).parse()
    }

    /// Takes a unicode domain, converts to ascii, and back to unicode.
    /// This has the effective of normalising it, so its easier to compare
    /// what was queried, and what was returned.
    fn normalise_domain(domain: &str) -> Result<String, idna::Errors> {
        let ascii = idna::domain_to_ascii(domain)?;
        let (mut unicode, result) = idna::domain_to_unicode(&ascii);
        match result {
            Ok(_) => {
                if !unicode.ends_with('.') {
                    unicode.push('.')
                }
                Ok(unicode)
            }
            Err(errors) => Err(errors),
        }
    }

    /// Adds a question to the message.
    pub fn add_question(&mut self, domain: &str, r#type: Type, class: Class) {
        let domain = Message::normalise_domain(domain).expect("invalid domain");

        let q = Question {
            name: domain,
            r#type,
            class,
        };

        self.questions.push(q);
    }

    /// Adds a record to the answers section.
    pub fn add_answer(&mut self, name: &str, class: Class, ttl: Duration, resource: Resource) {
        let name = Message::normalise_domain(name).expect("invalid domain");
        self.answers.push(Record {
            name,
            class,
            ttl,
            resource,
        });
    }

    /// Adds a record to the authoritys section.
    pub fn add_authority(&mut self, name: &str, class: Class, ttl: Duration, resource: Resource) {
        let name = Message::normalise_domain(name).expect("invalid domain");
        self.authoritys.push(Record {
            name,
            class,
            ttl,
            resource,
        });
    }

    /// Adds a record to the additionals section.
    pub fn add_additional(&mut self, name: &str, class: Class, ttl: Duration, resource: Resource) {
        let name = Message::normalise_domain(name).expect("invalid domain");
        self.additionals.push(Record {
            name,
            class,
            ttl,
            resource,
        });
    }

    /// Adds a EDNS(0) extension record, as defined by [rfc6891](https://datatracker.ietf.org/doc/html/rfc6891).
    pub fn add_extension(&mut self, ext: Extension) {
        self.extension = Some(ext);
    }

    // -- RFC 2136 UPDATE view -------------------------------------------
    //
    // The UPDATE opcode (`self.opcode == Opcode::Update`) reuses the four
    // record sequences above under different names (see the doc comment on
    // `Message` in types.rs): questions -> zone, answers -> prerequisites,
    // authoritys -> updates. These accessors are a thin, purely presentational
    // layer over that same storage.

    /// Returns the zone entry (the sole "question" under the UPDATE opcode).
    pub fn zone(&self) -> Option<&Question> {
        self.questions.first()
    }

    /// Sets the zone. Also switches `opcode` to [`Opcode::Update`].
    pub fn set_zone(&mut self, zone: &str, class: Class) {
        let name = Message::normalise_domain(zone).expect("invalid domain");
        self.opcode = Opcode::Update;
        self.questions = vec![Question {
            name,
            r#type: Type::SOA,
            class,
        }];
    }

    /// Returns the prerequisite records (RFC 2136 §2.4).
    pub fn prerequisites(&self) -> &[Record] {
        &self.answers
    }

    /// Adds a prerequisite record. `ttl` is conventionally zero (RFC 2136
    /// §2.4 prerequisites carry no caching lifetime).
    pub fn add_prerequisite(&mut self, name: &str, class: Class, resource: Resource) {
        self.add_answer(name, class, Duration::ZERO, resource);
    }

    /// Returns the update records (RFC 2136 §2.5).
    pub fn updates(&self) -> &[Record] {
        &self.authoritys
    }

    /// Adds an update record.
    pub fn add_update(&mut self, name: &str, class: Class, ttl: Duration, resource: Resource) {
        self.add_authority(name, class, ttl, resource);
    }

    /// Encodes this DNS [`Message`] as a [`Vec<u8>`] ready to be sent, as defined by [rfc1035].
    ///
    /// [rfc1035]: https://datatracker.ietf.org/doc/html/rfc1035
    pub fn to_vec(&self) -> io::Result<Vec<u8>> {
        let mut req = Vec::<u8>::with_capacity(512);

        req.write_u16::<BE>(self.id)?;

        let mut b = 0_u8;
        b |= if self.qr.to_bool() { 0b1000_0000 } else { 0 };
        b |= ((self.opcode as u8) << 3) & 0b0111_1000;
        b |= if self.aa { 0b0000_0100 } else { 0 };
        b |= if self.tc { 0b0000_0010 } else { 0 };
        b |= if self.rd { 0b0000_0001 } else { 0 };
        req.push(b);

        let mut b = 0_u8;
        b |= if self.ra { 0b1000_0000 } else { 0 };
        b |= if self.z { 0b0100_0000 } else { 0 };
        b |= if self.ad { 0b0010_0000 } else { 0 };
        b |= if self.cd { 0b0001_0000 } else { 0 };
        b |= (self.rcode as u8) & 0b0000_1111;

        req.push(b);

        let ar_count = self.additionals.len() as u16 + self.extension.is_some() as u16;

        req.write_u16::<BE>(self.questions.len() as u16)?;
        req.write_u16::<BE>(self.answers.len() as u16)?;
        req.write_u16::<BE>(self.authoritys.len() as u16)?;
        req.write_u16::<BE>(ar_count)?;

        for question in &self.questions {
            req.write_qname(&question.name)?;
            req.write_type(question.r#type)?;
            req.write_class(question.class)?;
        }

        write_records(&mut req, &self.answers)?;
        write_records(&mut req, &self.authoritys)?;
        write_records(&mut req, &self.additionals)?;

        if let Some(e) = &self.extension {
            e.write(&mut req)?
        }

        if req.len() > 65535 {
            bail!(
                InvalidInput,
                "encoded message of {} bytes exceeds the 65535 byte limit",
                req.len()
            );
        }

        Ok(req)
    }
}

fn write_records(buf: &mut Vec<u8>, records: &[Record]) -> io::Result<()> {
    for r in records {
        buf.write_qname(&r.name)?;
        buf.write_u16::<BE>(r.type_code())?;
        buf.write_class(r.class)?;
        buf.write_u32::<BE>(r.ttl.as_secs() as u32)?;

        let mut rdata = Vec::new();
        write_rdata(&r.resource, &mut rdata)?;

        buf.write_u16::<BE>(rdata.len() as u16)?;
        buf.write_all(&rdata)?;
    }
    Ok(())
}

impl Extension {
    fn parse(cur: &mut Cursor<&[u8]>, domain: &str) -> io::Result<Extension> {
        if domain != "." {
            bail!(
                InvalidData,
                "expected root domain for EDNS(0) extension, got '{}'",
                domain
            );
        }

        let payload_size = cur.read_u16::<BE>()?;
        let extend_rcode = cur.read_u8()?;

        let version = cur.read_u8()?;
        let b = cur.read_u8()?;
        let dnssec_ok = b & 0b1000_0000 == 0b1000_0000;

        let _z = cur.read_u8()?;

        let rd_len = cur.read_u16::<BE>()?;
        let pos = cur.position();
        cur.seek(io::SeekFrom::Start(pos + rd_len as u64))?;

        Ok(Extension {
            payload_size,
            extend_rcode,
            version,
            dnssec_ok,
        })
    }

    fn write(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.write_qname(".")?;
        buf.write_type(Type::OPT)?;
        buf.write_u16::<BE>(self.payload_size)?;

        buf.push(self.extend_rcode);
        buf.push(self.version);

        let mut b = 0_u8;
        b |= if self.dnssec_ok { 0b1000_0000 } else { 0 };

        buf.push(b);
        buf.push(0);

        // No OPT options (RDLENGTH 0).
        buf.write_u16::<BE>(0)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn query_round_trips() {
        let mut m = Message::default();
        m.id = 0x1234;
        m.rd = true;
        m.add_question("bramp.net", Type::A, Class::Internet);

        let buf = m.to_vec().unwrap();
        let m2 = Message::from_slice(&buf).unwrap();

        assert_eq!(m2.id, 0x1234);
        assert!(m2.rd);
        assert_eq!(m2.questions.len(), 1);
        assert_eq!(m2.questions[0].name, "bramp.net.");
        assert_eq!(m2.questions[0].r#type, Type::A);
    }

    #[test]
    fn answer_round_trips() {
        let mut m = Message::default();
        m.qr = QR::Response;
        m.add_question("bramp.net", Type::A, Class::Internet);
        m.add_answer(
            "bramp.net",
            Class::Internet,
            Duration::from_secs(300),
            Resource::A(Ipv4Addr::new(1, 2, 3, 4)),
        );

        let buf = m.to_vec().unwrap();
        let m2 = Message::from_slice(&buf).unwrap();

        assert_eq!(m2.answers.len(), 1);
        assert_eq!(m2.answers[0].resource, Resource::A(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(m2.answers[0].ttl, Duration::from_secs(300));
    }

    #[test]
    fn update_view_reuses_query_storage() {
        let mut m = Message::default();
        m.set_zone("example.org", Class::Internet);
        m.add_prerequisite("svc._http._tcp.example.org", Class::None, Resource::ANY);
        m.add_update(
            "svc._http._tcp.example.org",
            Class::Internet,
            Duration::from_secs(120),
            Resource::TXT(vec![b"path=/".to_vec()]),
        );

        assert_eq!(m.zone().unwrap().name, "example.org.");
        assert_eq!(m.prerequisites().len(), 1);
        assert_eq!(m.updates().len(), 1);

        let buf = m.to_vec().unwrap();
        let m2 = Message::from_slice(&buf).unwrap();

        assert_eq!(m2.zone().unwrap().name, "example.org.");
        assert_eq!(m2.prerequisites().len(), 1);
        assert_eq!(m2.updates().len(), 1);
    }

    #[test]
    fn unrecognised_record_type_falls_through_to_opaque_bytes() {
        let mut m = Message::default();
        m.qr = QR::Response;
        m.add_question("bramp.net", Type::A, Class::Internet);
        // 65280 has no assigned meaning; private-use range (rfc6895 §3.1).
        m.add_answer(
            "bramp.net",
            Class::Internet,
            Duration::from_secs(60),
            Resource::Unknown(65280, vec![1, 2, 3, 4]),
        );

        let buf = m.to_vec().unwrap();
        let m2 = Message::from_slice(&buf).unwrap();

        assert_eq!(m2.answers.len(), 1);
        match &m2.answers[0].resource {
            Resource::Unknown(code, bytes) => {
                assert_eq!(*code, 65280);
                assert_eq!(bytes, &vec![1, 2, 3, 4]);
            }
            other => panic!("expected Resource::Unknown, got {:?}", other),
        }
    }

    #[test]
    fn extension_round_trips() {
        let mut m = Message::default();
        m.add_question("bramp.net", Type::A, Class::Internet);
        m.add_extension(Extension {
            payload_size: 1232,
            extend_rcode: 0,
            version: 0,
            dnssec_ok: true,
        });

        let buf = m.to_vec().unwrap();
        let m2 = Message::from_slice(&buf).unwrap();

        let extension = m2.extension.unwrap();
        assert_eq!(extension.payload_size, 1232);
        assert!(extension.dnssec_ok);
    }
}
