// Copyright (C) 2025-2026 the inklings authors
//
// This file is part of inklings.
//
// inklings is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// inklings is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with inklings.  If not,
// see <http://www.gnu.org/licenses/>.

//! # inklings
//!
//! A small self-hosted blog service.
//!
//! The binary is deliberately thin: parse the command line, read the (TOML) configuration,
//! configure logging, build the PostgreSQL pool & bootstrap the schema, then serve the two JSON
//! routers until SIGINT/SIGTERM. There's no daemonization here -- run it in the foreground under
//! whatever supervisor you favor.

use std::{io, net::SocketAddr, path::PathBuf, str::FromStr, sync::Arc};

use clap::{crate_authors, crate_version, value_parser, Arg, ArgAction, Command};
use serde::Deserialize;
use snafu::{prelude::*, IntoError};
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    layer::SubscriberExt,
    Layer, Registry,
};

use inklings::{
    authors::make_router as make_authors_router, entries::make_router as make_entries_router,
    http::Inklings, postgres,
};

/// The inklings application error type
///
/// Note that [Debug] is implemented by hand: `main()` returns `Result<(), Error>`, and should the
/// `Err` variant come back, the runtime prints the `Debug` representation to stderr. The derived
/// implementation is unreadable (and, with backtraces in play, enormous), so `Debug` here just
/// delegates to `Display`.
#[derive(Snafu)]
enum Error {
    #[snafu(display("Failed to bind {address}: {source}"))]
    Bind {
        address: SocketAddr,
        source: io::Error,
    },
    #[snafu(display("Failed to read the configuration file {}: {source}", pth.display()))]
    ConfigNotFound { pth: PathBuf, source: io::Error },
    #[snafu(display("Failed to parse the configuration file {}: {source}", pth.display()))]
    ConfigParse {
        pth: PathBuf,
        source: toml::de::Error,
    },
    #[snafu(display("Bad logging filter: {source}"))]
    EnvFilter {
        source: tracing_subscriber::filter::FromEnvError,
    },
    #[snafu(display("Failed to serve: {source}"))]
    Serve { source: io::Error },
    #[snafu(display("Failed to install the SIGTERM handler: {source}"))]
    Sigterm { source: io::Error },
    #[snafu(display("Failed to setup storage: {source}"))]
    Storage { source: postgres::Error },
    #[snafu(display("Failed to install the logging subscriber: {source}"))]
    Subscriber {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         configuration                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Config {
    /// Local address at which to listen; specify as "address:port".
    address: SocketAddr,
    /// PostgreSQL connection parameters.
    db: postgres::Config,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            address: SocketAddr::from_str("0.0.0.0:8888").unwrap(/* known good */),
            db: postgres::Config::default(),
        }
    }
}

/// Parse the inklings configuration file; a missing file is only an error if the caller named it
/// explicitly.
fn parse_config(cfg: &Option<PathBuf>) -> Result<Config> {
    let (pth, defaulted): (PathBuf, bool) = cfg.as_ref().map_or_else(
        || (PathBuf::from_str("/etc/inklings.toml").unwrap(/* known good */), true),
        |p| (p.clone(), false),
    );
    match std::fs::read_to_string(&pth) {
        Ok(text) => toml::from_str::<Config>(&text)
            .map_err(|err| ConfigParseSnafu { pth }.into_error(err)),
        Err(err) => {
            if defaulted {
                Ok(Config::default())
            } else {
                Err(ConfigNotFoundSnafu { pth }.into_error(err))
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            logging                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn configure_logging(plain: bool, debug: bool) -> Result<()> {
    let default = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env()
        .context(EnvFilterSnafu)?;
    // `compact()` & `json()` produce layers *of different types*; box 'em to pick one at runtime.
    let formatter: Box<dyn Layer<Registry> + Send + Sync> = if plain {
        Box::new(fmt::Layer::default().compact().with_writer(io::stdout))
    } else {
        Box::new(fmt::Layer::default().json().with_writer(io::stdout))
    };
    tracing::subscriber::set_global_default(Registry::default().with(formatter).with(filter))
        .context(SubscriberSnafu)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           the service                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

async fn serve(cfg: Config) -> Result<()> {
    let storage = postgres::Backend::new(&cfg.db).await.context(StorageSnafu)?;
    let state = Arc::new(Inklings {
        storage: Box::new(storage),
    });

    let router = make_entries_router(state.clone())
        .merge(make_authors_router(state))
        .layer(TraceLayer::new_for_http());

    let mut sigterm = signal(SignalKind::terminate()).context(SigtermSnafu)?;
    let listener = TcpListener::bind(cfg.address)
        .await
        .context(BindSnafu {
            address: cfg.address,
        })?;
    info!("inklings listening on {}", cfg.address);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("SIGINT; shutting down"),
                _ = sigterm.recv() => info!("SIGTERM; shutting down"),
            }
        })
        .await
        .context(ServeSnafu)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("inklings")
        .version(crate_version!())
        .author(crate_authors!())
        .about("A small self-hosted blog service")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .env("INKLINGS_CONFIG")
                .help(
                    "path (absolute or relative to the process' current directory) to a \
                     configuration file",
                ),
        )
        .arg(
            Arg::new("debug")
                .short('D')
                .long("debug")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("INKLINGS_DEBUG")
                .help("produce debug output"),
        )
        .arg(
            Arg::new("plain")
                .short('p')
                .long("plain")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("INKLINGS_PLAIN")
                .help("log in human-readable format, not JSON/structured logging"),
        )
        .get_matches();

    let cfg = parse_config(&matches.get_one::<PathBuf>("config").cloned())?;
    configure_logging(
        matches.get_flag("plain"),
        matches.get_flag("debug"),
    )?;
    info!("inklings version {} starting.", crate_version!());

    serve(cfg).await
}
