//! DNS-SD service discovery: lookup (types/identifiers/records), publish,
//! and unpublish, composed from the resolver socket, the UPDATE builder and
//! the TSIG signer.

use crate::clients::Resolver;
use crate::errors::ResolverError;
use crate::tsig::Key;
use crate::types::{Class, Message, Resource, Type};
use indexmap::IndexMap;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

/// A resolved service instance (§3 "Service record").
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceRecord {
    pub hostname: String,
    pub service_type: String,
    pub service_name: String,
    pub endpoint: String,
    pub port: u16,
    pub metadata: IndexMap<String, String>,
}

/// Issues PTR queries for `_services._dns-sd._udp.<domain>` against every
/// browsing domain and flattens the results into service type strings.
pub async fn lookup_types(resolver: &Resolver, browsing_domains: &[&str]) -> Result<Vec<String>, ResolverError> {
    let mut types = Vec::new();
    for domain in browsing_domains {
        let name = format!("_services._dns-sd._udp.{}", domain);
        let mut query = Message::default();
        query.add_question(&name, Type::PTR, Class::Internet);

        let response = resolver.exchange(query).await?;
        for answer in &response.answers {
            if let Resource::PTR(target) = &answer.resource {
                types.push(target.clone());
            }
        }
    }
    Ok(types)
}

/// Issues a PTR query for `<type>.<domain>.` and maps each answer to a full
/// instance identifier `<instance>.<type>.<domain>.`.
pub async fn lookup_identifiers(resolver: &Resolver, service_type: &str, domain: &str) -> Result<Vec<String>, ResolverError> {
    let name = format!("{}.{}", service_type, domain);
    let mut query = Message::default();
    query.add_question(&name, Type::PTR, Class::Internet);

    let response = resolver.exchange(query).await?;
    Ok(response
        .answers
        .iter()
        .filter_map(|r| match &r.resource {
            Resource::PTR(target) => Some(target.clone()),
            _ => None,
        })
        .collect())
}

/// Resolves a full service identifier into a [`ServiceRecord`] by issuing
/// SRV and TXT queries.
pub async fn lookup_record(resolver: &Resolver, identifier: &str) -> Result<ServiceRecord, ResolverError> {
    let mut srv_query = Message::default();
    srv_query.add_question(identifier, Type::SRV, Class::Internet);
    let srv_response = resolver.exchange(srv_query).await?;

    let mut txt_query = Message::default();
    txt_query.add_question(identifier, Type::TXT, Class::Internet);
    let txt_response = resolver.exchange(txt_query).await?;

    let srvs: Vec<&crate::resource::SRV> = srv_response
        .answers
        .iter()
        .filter_map(|r| match &r.resource {
            Resource::SRV(srv) => Some(srv),
            _ => None,
        })
        .collect();

    let chosen = choose_srv(&srvs).ok_or(ResolverError::ResponseNotExpected)?;

    let mut metadata = IndexMap::new();
    for answer in &txt_response.answers {
        if let Resource::TXT(strings) = &answer.resource {
            for (key, value) in txt::parse(strings) {
                metadata.insert(key, value);
            }
        }
    }

    Ok(ServiceRecord {
        hostname: chosen.target.clone(),
        service_type: identifier.to_string(),
        service_name: identifier.to_string(),
        endpoint: chosen.target.clone(),
        port: chosen.port,
        metadata,
    })
}

/// Chooses one SRV option per RFC 2782: minimum priority, then
/// weighted-random selection among ties.
fn choose_srv<'a>(options: &[&'a crate::resource::SRV]) -> Option<&'a crate::resource::SRV> {
    let min_priority = options.iter().map(|s| s.priority).min()?;
    let candidates: Vec<&&crate::resource::SRV> = options.iter().filter(|s| s.priority == min_priority).collect();

    let total_weight: u32 = candidates.iter().map(|s| s.weight as u32).sum();
    if total_weight == 0 {
        return candidates.first().copied().copied();
    }

    let random: u32 = rand::thread_rng().gen_range(0..=255);
    let cutoff = (random as u64 * total_weight as u64 / 255) as u32;

    let mut running = total_weight;
    for candidate in &candidates {
        running -= candidate.weight as u32;
        if running <= cutoff {
            return Some(candidate);
        }
    }

    candidates.last().copied().copied()
}

/// RFC 2136 UPDATE construction plus RFC 2845 signing for DNS-SD
/// registration and de-registration.
pub struct Publisher<'a> {
    pub resolver: &'a Resolver,
    pub key: Key,
}

impl<'a> Publisher<'a> {
    pub fn new(resolver: &'a Resolver, key: Key) -> Publisher<'a> {
        Publisher { resolver, key }
    }

    /// Publishes `instance` of `service_type` under `domain`, with the given
    /// `target`/`port` and metadata attributes.
    pub async fn publish(
        &self,
        domain: &str,
        service_type: &str,
        instance: &str,
        target: &str,
        port: u16,
        metadata: &HashMap<String, String>,
    ) -> Result<(), ResolverError> {
        let full_type = format!("{}.{}", service_type, domain);
        let full_instance = format!("{}.{}", instance, full_type);

        let mut update = Message::default();
        update.set_zone(domain, Class::Internet);

        // Prerequisite: the instance must not already exist.
        update.add_prerequisite(&full_instance, Class::None, Resource::ANY);

        update.add_update(
            &format!("_services._dns-sd._udp.{}", domain),
            Class::Internet,
            Duration::from_secs(4500),
            Resource::PTR(full_type.clone()),
        );
        update.add_update(&full_type, Class::Internet, Duration::from_secs(4500), Resource::PTR(full_instance.clone()));

        // Additional PTRs for each intermediate type suffix (e.g. a
        // registration under "_printer._sub._http._tcp" also gets one under
        // "_http._tcp" and "_tcp"), so browsing at any suffix level finds it.
        let type_labels: Vec<&str> = service_type.split('.').filter(|l| !l.is_empty()).collect();
        for i in 1..type_labels.len() {
            let suffix_name = format!("{}.{}", type_labels[i..].join("."), domain);
            update.add_update(&suffix_name, Class::Internet, Duration::from_secs(4500), Resource::PTR(full_type.clone()));
        }

        update.add_update(
            &full_instance,
            Class::Internet,
            Duration::from_secs(120),
            Resource::SRV(crate::resource::SRV {
                priority: 0,
                weight: 0,
                port,
                target: target.to_string(),
            }),
        );
        update.add_update(
            &full_instance,
            Class::Internet,
            Duration::from_secs(4500),
            Resource::TXT(txt::write(metadata)),
        );

        self.send_signed(update).await
    }

    /// Retracts a previously published instance, mirroring [`Publisher::publish`].
    pub async fn unpublish(&self, domain: &str, service_type: &str, instance: &str, target: &str, port: u16) -> Result<(), ResolverError> {
        let full_type = format!("{}.{}", service_type, domain);
        let full_instance = format!("{}.{}", instance, full_type);

        let mut update = Message::default();
        update.set_zone(domain, Class::Internet);

        update.add_prerequisite(&full_instance, Class::Any, Resource::ANY);

        update.add_update(&full_type, Class::None, Duration::ZERO, Resource::PTR(full_instance.clone()));
        update.add_update(
            &full_instance,
            Class::None,
            Duration::ZERO,
            Resource::SRV(crate::resource::SRV {
                priority: 0,
                weight: 0,
                port,
                target: target.to_string(),
            }),
        );
        update.add_update(&full_instance, Class::None, Duration::ZERO, Resource::TXT(vec![]));

        self.send_signed(update).await
    }

    async fn send_signed(&self, update: Message) -> Result<(), ResolverError> {
        let signed = crate::tsig::sign_and_append(&update, &self.key).map_err(ResolverError::Other)?;

        let response = self.resolver.exchange_raw_tcp(update.id, &signed).await?;
        if response.rcode != crate::types::Rcode::NoError {
            return Err(ResolverError::ResponseBad(response.rcode));
        }
        Ok(())
    }
}

/// Enumerates external (non-loopback) interface addresses, resolves each via
/// reverse PTR, and returns the parent domain of each resolved name (its
/// first label dropped) as a search domain.
pub async fn discover_search_domains(resolver: &Resolver) -> Result<Vec<String>, ResolverError> {
    let mut domains = Vec::new();

    let interfaces = if_addrs::get_if_addrs().map_err(ResolverError::Other)?;
    for iface in interfaces {
        if iface.is_loopback() {
            continue;
        }

        let ip = iface.ip();
        let arpa_name = match ip {
            std::net::IpAddr::V4(v4) => {
                let octets = v4.octets();
                format!(
                    "{}.{}.{}.{}.in-addr.arpa",
                    octets[3], octets[2], octets[1], octets[0]
                )
            }
            std::net::IpAddr::V6(_) => continue, // ip6.arpa reversal omitted; IPv4 covers the common case.
        };

        let mut query = Message::default();
        query.add_question(&arpa_name, Type::PTR, Class::Internet);

        if let Ok(response) = resolver.exchange(query).await {
            for answer in &response.answers {
                if let Resource::PTR(name) = &answer.resource {
                    if let Some((_, rest)) = name.trim_end_matches('.').split_once('.') {
                        domains.push(format!("{}.", rest));
                    }
                }
            }
        }
    }

    Ok(domains)
}

/// RFC 1464 TXT `key=value` attribute encoding.
pub mod txt {
    use std::collections::HashMap;

    /// Characters that must be backtick-escaped on both the key and value
    /// side (per §9 open question (c): the source only escaped the key,
    /// judged a latent bug and fixed here for symmetry).
    const ESCAPED: &[u8] = &[b'\t', b'\n', b' ', b'=', b'`'];

    fn escape(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            let is_escaped = c.is_ascii() && ESCAPED.contains(&(c as u8));
            if is_escaped {
                out.push('`');
                out.push(c);
            } else if (0x21..=0x7e).contains(&(c as u32)) {
                out.push(c);
            }
            // Other characters outside 0x21..0x7e are dropped.
        }
        out
    }

    fn unescape(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '`' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Writes `attributes` as TXT character-strings, one per key=value pair.
    pub fn write(attributes: &HashMap<String, String>) -> Vec<Vec<u8>> {
        attributes
            .iter()
            .map(|(k, v)| format!("{}={}", escape(&k.to_lowercase()), escape(v)).into_bytes())
            .collect()
    }

    /// Parses TXT character-strings into key=value pairs; entries without an
    /// unescaped `=` are discarded.
    pub fn parse(strings: &[Vec<u8>]) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for raw in strings {
            let s = match std::str::from_utf8(raw) {
                Ok(s) => s,
                Err(_) => continue,
            };

            if let Some(split_at) = find_unescaped_eq(s) {
                let key = unescape(&s[..split_at]).to_lowercase();
                let value = unescape(&s[split_at + 1..]);
                out.push((key, value));
            }
        }
        out
    }

    fn find_unescaped_eq(s: &str) -> Option<usize> {
        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'`' {
                i += 2;
                continue;
            }
            if bytes[i] == b'=' {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn round_trips_simple_attributes() {
            let mut attrs = HashMap::new();
            attrs.insert("path".to_string(), "/".to_string());
            attrs.insert("version".to_string(), "1".to_string());

            let written = write(&attrs);
            let parsed: HashMap<String, String> = parse(&written).into_iter().collect();

            assert_eq!(parsed.get("path"), Some(&"/".to_string()));
            assert_eq!(parsed.get("version"), Some(&"1".to_string()));
        }

        #[test]
        fn escapes_equals_signs_in_values_symmetrically() {
            let mut attrs = HashMap::new();
            attrs.insert("q".to_string(), "a=b".to_string());

            let written = write(&attrs);
            let parsed: HashMap<String, String> = parse(&written).into_iter().collect();

            assert_eq!(parsed.get("q"), Some(&"a=b".to_string()));
        }

        #[test]
        fn lower_cases_keys() {
            let mut attrs = HashMap::new();
            attrs.insert("Path".to_string(), "/".to_string());

            let written = write(&attrs);
            let parsed: HashMap<String, String> = parse(&written).into_iter().collect();

            assert!(parsed.contains_key("path"));
        }
    }
}
