use crate::args::ServeArgs;
use crate::commands::Out;
use crate::server::{self, ServerSettings};
use crate::{Config, Result};

/// Settings from the config file, overridden by whatever was given on the command line or in
/// the environment.
pub(crate) fn settings(config: &Config, args: &ServeArgs) -> ServerSettings {
    ServerSettings::new(
        args.port().unwrap_or(config.port()),
        args.allowed_origin().unwrap_or(config.allowed_origin()),
        args.allowed_tokens()
            .unwrap_or(config.allowed_tokens())
            .to_vec(),
    )
}

/// Runs the REST API until the process is stopped.
pub async fn serve(config: Config, args: &ServeArgs) -> Result<Out<()>> {
    let settings = settings(&config, args);
    let db = config.db().await?;
    server::serve(db, &settings).await?;
    Ok("The server has stopped".into())
}
