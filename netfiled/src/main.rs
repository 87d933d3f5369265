// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::BufRead;
use std::net::TcpStream;

use anyhow::Context;
use clap::{Parser, Subcommand};
use libnetfiled::line_socket::LineSocket;

#[derive(Parser, Debug)]
#[command(name = "netfiled", version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the server, reading `base`/`port`/users from a config file.
    Serve {
        /// Path to the line-oriented config file (spec.md §6).
        #[arg(long, default_value = "/etc/netfiled/netfiled.conf")]
        config: String,
    },
    /// A thin REPL test client: reads stdin lines, writes them to the
    /// server, and prints each reply line.
    Client {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long)]
        port: u16,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Serve { config } => {
            let config = libnetfiled::config::read_config(&config)?;
            if let Err(e) = libnetfiled::run(config) {
                tracing::error!("server exited with error: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Client { host, port } => run_client(&host, port)?,
    }
    Ok(())
}

fn run_client(host: &str, port: u16) -> anyhow::Result<()> {
    let stream =
        TcpStream::connect((host, port)).with_context(|| format!("connecting to {host}:{port}"))?;
    let mut socket = LineSocket::new(stream, false).context("preparing client socket")?;

    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.is_empty() {
            continue;
        }
        socket.write_line(&line).context("writing command")?;
        match socket.read_line_blocking().context("reading reply")? {
            Some(reply) => println!("{reply}"),
            None => {
                println!("connection closed by server");
                break;
            }
        }
    }
    Ok(())
}
