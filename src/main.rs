fn main() {
    if let Err(err) = income_insights::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
