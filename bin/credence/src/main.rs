fn main() {
    if let Err(err) = credence::cli::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
