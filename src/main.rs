fn main() {
    if let Err(err) = insightstream::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
