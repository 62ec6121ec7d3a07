use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::Mutex;

use chnative::{CancelHandle, Client, Command, Config, Host, HostSelectionPolicy, QueryResult, TlsConfig, cli, prompt};

/// Exit status after Ctrl-C at the prompt, as a shell reports SIGINT.
const INTERRUPTED: i32 = 130;

/// Cancel handle of the query being printed, if any.
type Running = Arc<Mutex<Option<CancelHandle>>>;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address as host:port. Repeat for failover.
    #[arg(long = "host", default_value = "localhost:9000")]
    hosts: Vec<String>,

    /// Try hosts in random order instead of round robin
    #[arg(long)]
    random_hosts: bool,

    #[arg(long, short, default_value = "default")]
    database: String,

    #[arg(long, short, default_value = "default")]
    user: String,

    #[arg(long, default_value = "")]
    password: String,

    /// LZ4 compression of data blocks
    #[arg(long)]
    compression: bool,

    #[arg(long)]
    tls: bool,

    /// Accept any server certificate
    #[arg(long, requires = "tls")]
    insecure: bool,

    /// PEM file with trusted CA certificates
    #[arg(long, requires = "tls")]
    ca_file: Option<PathBuf>,

    /// Seconds to wait for each server packet, 0 to wait forever
    #[arg(long, default_value_t = 60)]
    query_timeout: u64,

    /// Print column names before each result
    #[arg(long)]
    header: bool,

    /// Run one statement and exit
    #[arg(long, short)]
    query: Option<String>,
}

fn parse_host(s: &str) -> Result<Host, String> {
    let (host, port) = match s.rsplit_once(':') {
        Some((host, port)) if !host.ends_with(':') => {
            let port = port.parse().map_err(|e| format!("invalid port in {s:?}: {e}"))?;
            (host.trim_start_matches('[').trim_end_matches(']'), port)
        }
        _ => (s, chnative::config::DEFAULT_PORT),
    };
    Ok(Host::new(host, port))
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let hosts = cli.hosts.iter().map(|h| parse_host(h)).collect::<Result<Vec<_>, _>>()?;
    let config = Config {
        hosts,
        host_selection: if cli.random_hosts {
            HostSelectionPolicy::Random
        } else {
            HostSelectionPolicy::RoundRobin
        },
        database: cli.database,
        user: cli.user,
        password: cli.password,
        compression: cli.compression,
        query_timeout: Duration::from_secs(cli.query_timeout),
        tls: cli.tls.then(|| TlsConfig {
            verify: !cli.insecure,
            ca_file: cli.ca_file,
            ..TlsConfig::default()
        }),
        ..Config::default()
    };

    let client = Client::connect(config)?;
    let running: Running = Arc::new(Mutex::new(None));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || match running.lock().as_mut() {
            Some(handle) => {
                if let Err(e) = handle.cancel() {
                    eprintln!("cancel failed: {e}");
                }
            }
            None => process::exit(INTERRUPTED),
        })?;
    }

    if let Some(sql) = cli.query {
        return run(&client, &sql, cli.header, &running);
    }

    let stdin = io::stdin();
    loop {
        let cmd = match prompt(stdin.lock(), StdOut { inner: io::stdout() }) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        match cmd {
            Command::Exit => break,
            Command::Ping => match client.ping() {
                Ok(true) => println!("pong"),
                Ok(false) => eprintln!("connection lost"),
                Err(e) => eprintln!("ping error: {e}"),
            },
            Command::Sql(sql) if sql.is_empty() => {}
            Command::Sql(sql) => {
                if let Err(e) = run(&client, &sql, cli.header, &running) {
                    eprintln!("query error: {e}");
                }
            }
        }
    }

    client.close();
    Ok(())
}

/// Streams the result of `sql` to stdout. Ctrl-C cancels the query on the server.
fn run(client: &Client, sql: &str, header: bool, running: &Running) -> Result<(), Box<dyn Error>> {
    let mut result = client.query(sql)?;
    *running.lock() = Some(result.cancel_handle()?);
    let printed = print(&mut result, header);
    running.lock().take();

    let rows = printed?;
    eprintln!("{rows} rows");
    Ok(())
}

fn print(result: &mut QueryResult<'_>, mut header: bool) -> Result<usize, Box<dyn Error>> {
    let mut stdout = io::stdout().lock();
    let mut rows = 0;
    for block in result {
        let block = block?;
        if block.rows() == 0 && !header {
            continue;
        }
        cli::write_tsv(&mut stdout, &block, header)?;
        header = false;
        rows += block.rows();
    }
    stdout.flush()?;
    Ok(rows)
}

/// StdOut wrapper that flushes after every write, so the prompt shows up before input.
struct StdOut<W: io::Write> {
    inner: W,
}

impl<W: io::Write> io::Write for StdOut<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.inner.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
