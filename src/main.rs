use anyhow::Context;
use notifyreg::{config::get_or_init_config, App};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // We have a different logging mechanism for production
    #[cfg(not(debug_assertions))]
    {
        notifyreg::init_production_tracing()
    }
    #[cfg(debug_assertions)]
    {
        notifyreg::init_dbg_tracing();
    }

    let config = get_or_init_config();
    let app = App::build_from_config(config)
        .await
        .context("failed to build the app from config")?;

    notifyreg::serve(app)
        .await
        .context("server stopped with an error")?;

    Ok(())
}
