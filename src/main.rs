// Entrypoint for the terminal client.
// - Keeps `main` small: read configuration, start logging, build the API
//   client and controller, and hand them to the UI loop.
// - Returns `anyhow::Result` to simplify error handling at the top level.

use spleeter_studio::{
    api::ApiClient, config::Config, controller::UploadController, logging, ui::main_menu,
};

fn main() -> anyhow::Result<()> {
    // Settings come from SPLEETER_* environment variables; see
    // `config::Config::from_env`.
    let config = Config::from_env();
    if let Some(path) = logging::initialize(config.log_level) {
        log::info!("logging to {}", path.display());
    }

    let api = ApiClient::new(&config)?;
    let controller = UploadController::new(api, config);

    // Start the interactive menu. This call blocks until the user exits.
    main_menu(controller)?;
    Ok(())
}
