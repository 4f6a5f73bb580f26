//! Command: print version information.

/// Version string baked in at build time.
#[must_use]
pub fn version() -> &'static str {
    option_env!("EXTPACK_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the extpack version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("extpack {}", version());
}
