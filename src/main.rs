use cabin_booking::{
    configuration::Configuration, configuration_handler::ConfigurationHandler, http::create_app,
    local_bookings::LocalBookings,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("#################");
    println!("# Cabin Booking #");
    println!("#################");

    let configuration = ConfigurationHandler::parse_arguments();
    if let Err(err) = run(configuration).await {
        error!(%err, "Cabin booking service stopped");
        std::process::exit(1);
    }
}

async fn run(configuration: ConfigurationHandler) -> Result<(), BoxError> {
    let backend = match configuration.data_file() {
        Some(path) => {
            info!(path = %path.display(), "Persisting bookings to file");
            LocalBookings::open(path)?
        }
        None => {
            info!("No data file configured, bookings are kept in memory");
            LocalBookings::default()
        }
    };
    let app = create_app(backend, &configuration)?;

    let address = format!("0.0.0.0:{}", configuration.port());
    println!("Accessible at:\n{address}/api");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    axum::serve(listener, app).await?;
    Ok(())
}
