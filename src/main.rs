fn main() -> Result<(), Box<dyn std::error::Error>> {
    ema::cli::main()
}
