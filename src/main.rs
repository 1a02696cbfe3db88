fn main() {
    #[cfg(feature = "cli")]
    rser::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("rser: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
