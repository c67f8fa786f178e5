fn main() {
    if let Err(err) = pledge_validator::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
