use taos_pool_demo::config::USAGE;
use taos_pool_demo::{Error, Runtime, Settings};

fn main() -> Result<(), Error> {
    let settings = match Settings::from_args(std::env::args().skip(1)) {
        Ok(settings) => settings,
        Err(Error::MissingHost) => {
            println!("{}", USAGE);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_thread_names(true)
        .init();

    let rt = Runtime::new(&settings)?;
    let report = rt.block_on(taos_pool_demo::run(settings))?;
    println!("{:?}", report);
    Ok(())
}
