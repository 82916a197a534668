use foodgram::{routes, Config, State};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    let port = config.port;

    let state = match State::new(config).await {
        Ok(state) => state,
        Err(e) => {
            log::error!("Could not start: {e}");
            std::process::exit(1);
        }
    };

    log::info!("Listening on 0.0.0.0:{port}");
    warp::serve(routes(state)).run(([0, 0, 0, 0], port)).await;
}
