//! Logging setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter directive for the given `-v` count, used when `RUST_LOG` is unset.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "medbot=info",
        1 => "medbot=debug",
        _ => "medbot=trace",
    }
}

/// Install a human-readable subscriber on stderr.
///
/// `RUST_LOG` takes precedence over the verbosity flag. Stdout is left for
/// answers so `medbot ask` output can be piped.
pub fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let stderr_layer =
        tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr);

    // A second call (as in tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(filter).with(stderr_layer).try_init();
}
