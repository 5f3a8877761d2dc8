use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use sam_monthly::{
    config::{self, Args, Mode, Settings},
    db::{
        s3::object_store::S3Store,
        sam::lib_sam::HttpFetcher,
    },
    errors::{SamError, EXIT_INVALID_PARAMETERS, EXIT_OTHER_ERROR, EXIT_SUCCESS},
    logging,
    pipeline::{Pipeline, RunContext, RunOutcome},
};

async fn run(ctx: RunContext) -> Result<RunOutcome, SamError> {
    let store = match &ctx.settings.mode {
        Mode::Publish { s3, .. } => Some(S3Store::new(&s3.access_key, &s3.secret_key, &s3.region)),
        Mode::OnlyDownload => None,
    };
    let pipeline = Pipeline::new(&ctx, HttpFetcher::new()?, store);
    pipeline.run().await
}

/// Run this job daily during the first ten days of the month
#[tokio::main]
async fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().collect();
    if let Some(name) = config::env_name(&raw) {
        match config::load_env_file(&name) {
            Ok(Some(_)) => {}
            Ok(None) => eprintln!("No env file .env/{}.env, skipped", name),
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::from(e.exit_code());
            }
        }
    }

    let args = match Args::try_parse_from(&raw) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_INVALID_PARAMETERS)
            } else {
                ExitCode::from(EXIT_SUCCESS)
            };
        }
    };

    let settings = match Settings::try_from(args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    if let Err(e) = logging::init(&settings) {
        eprintln!("{}", e.report());
        return ExitCode::from(e.exit_code());
    }

    info!("Started");
    let ctx = RunContext::new(settings);
    match tokio::spawn(run(ctx)).await {
        Ok(Ok(outcome)) => {
            info!("{:?}", outcome);
            info!("Normal completion");
            ExitCode::from(EXIT_SUCCESS)
        }
        Ok(Err(e)) => {
            error!("{}", e.report());
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            error!("An unhandled error occurred: {}", e);
            ExitCode::from(EXIT_OTHER_ERROR)
        }
    }
}
