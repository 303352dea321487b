//! RFC 2845 Transaction Signatures (TSIG): per-message HMAC authentication
//! for DNS UPDATE traffic.
//!
//! Grounded on the pack's closest analogue, `ifdyndnsd`'s TSIG module: an
//! `Algorithm` enum selecting a digest, composed generically with the `hmac`
//! crate over `md-5`/`sha1`/`sha2`.

use crate::io::DNSWriteExt;
use crate::types::{Class, Message, Record, Resource};
use hmac::{Hmac, Mac};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use strum_macros::{Display, EnumString};

/// TSIG HMAC algorithm family (rfc2845 §2.3).
#[derive(Copy, Clone, Debug, Display, EnumString, PartialEq, Eq)]
pub enum Algorithm {
    #[strum(serialize = "hmac-md5")]
    HmacMd5,
    #[strum(serialize = "hmac-sha1")]
    HmacSha1,
    #[strum(serialize = "hmac-sha224")]
    HmacSha224,
    #[strum(serialize = "hmac-sha256")]
    HmacSha256,
    #[strum(serialize = "hmac-sha384")]
    HmacSha384,
    #[strum(serialize = "hmac-sha512")]
    HmacSha512,
}

impl Algorithm {
    /// Canonical dotted algorithm name carried on the wire (rfc2845 §4.2).
    pub fn canonical_name(self) -> &'static str {
        match self {
            Algorithm::HmacMd5 => "HMAC-MD5.SIG-ALG.REG.INT.",
            Algorithm::HmacSha1 => "hmac-sha1.",
            Algorithm::HmacSha224 => "hmac-sha224.",
            Algorithm::HmacSha256 => "hmac-sha256.",
            Algorithm::HmacSha384 => "hmac-sha384.",
            Algorithm::HmacSha512 => "hmac-sha512.",
        }
    }

    fn sign(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            Algorithm::HmacMd5 => mac_of::<Hmac<md5::Md5>>(key, data),
            Algorithm::HmacSha1 => mac_of::<Hmac<sha1::Sha1>>(key, data),
            Algorithm::HmacSha224 => mac_of::<Hmac<sha2::Sha224>>(key, data),
            Algorithm::HmacSha256 => mac_of::<Hmac<sha2::Sha256>>(key, data),
            Algorithm::HmacSha384 => mac_of::<Hmac<sha2::Sha384>>(key, data),
            Algorithm::HmacSha512 => mac_of::<Hmac<sha2::Sha512>>(key, data),
        }
    }
}

fn mac_of<M: Mac>(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = M::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// A TSIG key: the shared secret plus the name it is known by to both
/// parties (rfc2845 §2.1) and the algorithm it signs with.
#[derive(Clone, Debug, PartialEq)]
pub struct Key {
    pub name: String,
    pub secret: Vec<u8>,
    pub algorithm: Algorithm,
    pub fudge: u16,
}

impl Key {
    pub fn new(name: impl Into<String>, secret: Vec<u8>, algorithm: Algorithm) -> Key {
        Key {
            name: name.into(),
            secret,
            algorithm,
            fudge: 300,
        }
    }
}

/// Computes the TSIG record that authenticates `encoded`, the already-encoded
/// bytes of a [`Message`] whose `id` field is `original_id`.
///
/// Per rfc2845 §3.4.2, the record is never counted in `encoded`'s own header;
/// callers append it and bump ARCOUNT by one (see [`sign_and_append`]).
pub fn compute(key: &Key, encoded: &[u8], original_id: u16, time_signed: u64) -> Record {
    let mut trailer = Vec::new();
    trailer.write_qname(&key.name).expect("in-memory writer never fails");
    trailer
        .write_class(Class::Any)
        .expect("in-memory writer never fails");
    // TTL (4 bytes) is always zero for TSIG.
    trailer.extend_from_slice(&0u32.to_be_bytes());
    trailer
        .write_qname(key.algorithm.canonical_name())
        .expect("in-memory writer never fails");
    trailer
        .write_u48(time_signed)
        .expect("in-memory writer never fails");
    trailer.extend_from_slice(&key.fudge.to_be_bytes());
    trailer.extend_from_slice(&0u16.to_be_bytes()); // error
    trailer.extend_from_slice(&0u16.to_be_bytes()); // other-length

    let mut signed = Vec::with_capacity(encoded.len() + trailer.len());
    signed.extend_from_slice(encoded);
    signed.extend_from_slice(&trailer);

    let mac = key.algorithm.sign(&key.secret, &signed);

    Record {
        name: key.name.clone(),
        class: Class::Any,
        ttl: Duration::ZERO,
        resource: Resource::TSIG(crate::resource::Tsig {
            algorithm_name: key.algorithm.canonical_name().to_string(),
            time_signed,
            fudge: key.fudge,
            mac,
            original_id,
            error: 0,
            other_data: Vec::new(),
        }),
    }
}

/// Signs `message` with `key` and returns the final wire bytes with the TSIG
/// record appended to ADDITIONALS and ARCOUNT patched in place.
///
/// This mirrors rfc2845 §3.4: the signer runs over the message as it would be
/// sent *without* the TSIG record, then the record is appended afterwards.
pub fn sign_and_append(message: &Message, key: &Key) -> std::io::Result<Vec<u8>> {
    let encoded = message.to_vec()?;

    let time_signed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let tsig_record = compute(key, &encoded, message.id, time_signed);

    let mut rdata = Vec::new();
    crate::resource::write_rdata(&tsig_record.resource, &mut rdata)?;

    let mut record_bytes = Vec::new();
    record_bytes.write_qname(&tsig_record.name)?;
    record_bytes.write_type(tsig_record.r#type())?;
    record_bytes.write_class(tsig_record.class)?;
    record_bytes.extend_from_slice(&0u32.to_be_bytes()); // TTL
    record_bytes.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    record_bytes.extend_from_slice(&rdata);

    let mut out = encoded;
    out.extend_from_slice(&record_bytes);

    // Patch ARCOUNT (header bytes 10-11) in place.
    let arcount = u16::from_be_bytes([out[10], out[11]]);
    let patched = (arcount + 1).to_be_bytes();
    out[10] = patched[0];
    out[11] = patched[1];

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Class, Type};

    // rfc2845 scenario: zone example.org., key k.example.org., secret
    // base64 "qBClkn0Qkk6w5DACRllq1w==", algorithm MD5, fudge 300, at a
    // fixed timestamp -- the MAC is fully deterministic given these inputs.
    fn test_key() -> Key {
        let secret = base64_decode("qBClkn0Qkk6w5DACRllq1w==");
        Key {
            name: "k.example.org.".to_string(),
            secret,
            algorithm: Algorithm::HmacMd5,
            fudge: 300,
        }
    }

    // Minimal base64 decoder so this test has no extra dev-dependency beyond
    // what the crate already carries for hex comparisons elsewhere.
    fn base64_decode(s: &str) -> Vec<u8> {
        fn val(c: u8) -> u8 {
            match c {
                b'A'..=b'Z' => c - b'A',
                b'a'..=b'z' => c - b'a' + 26,
                b'0'..=b'9' => c - b'0' + 52,
                b'+' => 62,
                b'/' => 63,
                _ => 0,
            }
        }
        let clean: Vec<u8> = s.bytes().filter(|&b| b != b'=').collect();
        let mut out = Vec::new();
        for chunk in clean.chunks(4) {
            let nums: Vec<u8> = chunk.iter().map(|&c| val(c)).collect();
            let n = nums.len();
            let b0 = nums[0] << 2 | nums.get(1).copied().unwrap_or(0) >> 4;
            out.push(b0);
            if n > 2 {
                let b1 = (nums[1] << 4 | nums[2] >> 2) & 0xff;
                out.push(b1);
            }
            if n > 3 {
                let b2 = (nums[2] << 6 | nums[3]) & 0xff;
                out.push(b2);
            }
        }
        out
    }

    #[test]
    fn compute_is_deterministic_for_fixed_inputs() {
        let key = test_key();

        let mut m = Message::default();
        m.id = 1;
        m.set_zone("example.org", Class::Internet);
        m.add_update(
            "svc._http._tcp.example.org",
            Class::Internet,
            Duration::from_secs(120),
            Resource::SRV(crate::resource::SRV {
                priority: 0,
                weight: 0,
                port: 8080,
                target: "node1.example.org.".to_string(),
            }),
        );
        let encoded = m.to_vec().unwrap();

        let record_a = compute(&key, &encoded, m.id, 1_600_000_000);
        let record_b = compute(&key, &encoded, m.id, 1_600_000_000);

        assert_eq!(record_a, record_b);
        assert!(matches!(record_a.resource, Resource::TSIG(_)));
        if let Resource::TSIG(tsig) = record_a.resource {
            assert_eq!(tsig.mac.len(), 16); // MD5 output
            assert_eq!(tsig.time_signed, 1_600_000_000);
        }
    }

    #[test]
    fn sign_and_append_patches_arcount() {
        let key = test_key();

        let mut m = Message::default();
        m.add_question("bramp.net", Type::A, Class::Internet);

        let signed = sign_and_append(&m, &key).unwrap();
        let arcount = u16::from_be_bytes([signed[10], signed[11]]);
        assert_eq!(arcount, 1);

        let parsed = Message::from_slice(&signed).unwrap();
        assert_eq!(parsed.additionals.len(), 1);
        assert!(matches!(parsed.additionals[0].resource, Resource::TSIG(_)));
    }
}
