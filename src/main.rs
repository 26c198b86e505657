use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    parlor::cli::main()
}
