// Simple dig style command line built on the async resolver socket.
// resolve [@server] [type] {domain...}
use ahconfig_core::cfg::ResolverConfig;
use ahconfig_core::clients::Resolver;
use ahconfig_core::types::*;
use ahconfig_core::util;
use std::env;
use std::net::{SocketAddr, ToSocketAddrs};
use std::process;
use std::str::FromStr;
use std::time::Duration;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Default)]
struct Args {
    servers: Vec<String>,
    r#type: Option<Type>,
    domains: Vec<String>,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Args> {
    let mut result = Args::default();
    let mut type_or_domain = Vec::<String>::new();

    for arg in args {
        if let Some(server) = arg.strip_prefix('@') {
            result.servers.push(server.to_string());
        } else {
            type_or_domain.push(arg);
        }
    }

    for arg in type_or_domain {
        if result.r#type.is_none() {
            if let Ok(r#type) = Type::from_str(&arg) {
                result.r#type = Some(r#type);
                continue;
            }
        }
        result.domains.push(arg);
    }

    if result.domains.is_empty() {
        result.domains.push(".".to_string());
    }

    if result.servers.is_empty() {
        eprintln!(";; No servers specified, using 8.8.8.8");
        result.servers.push("8.8.8.8".to_string());
    }

    Ok(result)
}

fn servers_to_sockaddrs(servers: &[String], default_port: u16) -> Result<Vec<SocketAddr>> {
    let mut out = Vec::new();
    for addr in servers {
        let resolved = match addr.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(_) => (addr.as_str(), default_port).to_socket_addrs()?,
        };
        out.extend(resolved);
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: resolve [@server] {{domain}} [type]");
            process::exit(1);
        }
    };

    let r#type = args.r#type.unwrap_or(Type::A);
    let servers = servers_to_sockaddrs(&args.servers, 53)?;

    let resolver = Resolver::new(ResolverConfig {
        servers,
        timeout: Duration::from_secs(5),
        ..ResolverConfig::default()
    })?;

    for domain in &args.domains {
        let mut query = Message::default();
        query.add_question(domain, r#type, Class::Internet);
        query.add_extension(Extension {
            payload_size: 4096,
            ..Default::default()
        });

        println!("query:");
        util::hexdump(&query.to_vec().expect("failed to encode the query"));
        println!();
        println!("{}", query);

        let resp = resolver.exchange(query).await?;

        println!("response:");
        println!("{}", resp);
    }

    Ok(())
}
