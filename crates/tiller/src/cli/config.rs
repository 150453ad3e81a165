use dotenvy::dotenv;
use eyre::Result;

/// Load a `.env` file if present. Variables already set win.
pub fn load_env() -> Result<()> {
    dotenv().ok();
    Ok(())
}
