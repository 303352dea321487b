//! ahconfig-core is the DNS/DNS-SD client plumbing and path-indexed
//! directory/validator core behind an Arrowhead-style configuration system.
//!
//! # Usage (low-level wire codec)
//!
//! ```rust
//! use ahconfig_core::Message;
//! use ahconfig_core::types::*;
//!
//! let mut m = Message::default();
//! m.add_question("bramp.net", Type::A, Class::Internet);
//!
//! let req = m.to_vec().expect("failed to encode DNS request");
//! let m2 = Message::from_slice(&req).expect("failed to parse request");
//! assert_eq!(m2.questions[0].name, "bramp.net.");
//! ```
//!
//! # Usage (resolver socket)
//!
//! ```no_run
//! use ahconfig_core::clients::Resolver;
//! use ahconfig_core::types::*;
//! use ahconfig_core::Message;
//!
//! # async fn go() -> Result<(), ahconfig_core::errors::ResolverError> {
//! let resolver = Resolver::new(Default::default())?;
//! let mut query = Message::default();
//! query.add_question("bramp.net", Type::A, Class::Internet);
//! let response = resolver.exchange(query).await?;
//! println!("{}", response);
//! # Ok(())
//! # }
//! ```
//!
//! # Usage (directory + validator)
//!
//! The [`directory`] module exposes a hierarchical path-indexed key/value
//! store backed by a single-writer memory-mapped engine; [`validator`] runs
//! template/document/patch validation inside that store's transactions.
//!
//! # Testing
//!
//! ```shell
//! $ cargo test --all
//! ```
//!
//! ## Reference
//!
//! * [rfc1035]: DOMAIN NAMES - IMPLEMENTATION AND SPECIFICATION
//! * [rfc2136]: Dynamic Updates in the Domain Name System (DNS UPDATE)
//! * [rfc2782]: A DNS RR for specifying the location of services (DNS SRV)
//! * [rfc2845]: Secret Key Transaction Authentication for DNS (TSIG)
//! * [rfc1464]: Using the Domain Name System To Store Arbitrary String Attributes
//!
//! [rfc1035]: https://datatracker.ietf.org/doc/html/rfc1035
//! [rfc2136]: https://datatracker.ietf.org/doc/html/rfc2136
//! [rfc2782]: https://datatracker.ietf.org/doc/html/rfc2782
//! [rfc2845]: https://datatracker.ietf.org/doc/html/rfc2845
//! [rfc1464]: https://datatracker.ietf.org/doc/html/rfc1464

#[cfg(feature = "clients")]
pub mod clients;
pub mod cfg;
mod dns;
#[cfg(feature = "clients")]
pub mod dnssd;
pub mod directory;
mod display;
pub mod errors;
mod io;
pub mod resource;
pub mod tsig;
pub mod types;
pub mod util;
pub mod validator;
pub mod value;

#[macro_use]
extern crate num_derive;

#[macro_use]
extern crate lazy_static;

// Pull up the various types that should be on the front page of the docs.
#[doc(inline)]
pub use crate::types::*;

#[doc(inline)]
pub use crate::resource::*;

#[cfg(feature = "clients")]
#[doc(inline)]
pub use crate::clients::Resolver;

pub use crate::errors::ParseError;
pub use crate::value::Value;
