mod responder;
mod router;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand, ValueEnum};
use crrmon_aws::AwsCloud;
use crrmon_cloud::{CloudServices, MemoryCloud};
use crrmon_common::{
    MonitorSettings, ProvisioningRequest, envelope::ResponseStatus, error::Result,
};
use crrmon_engine::{ControllerSys, MonitorResource};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    responder::Responder,
    router::{AppState, dispatch, invoke_router},
};

#[derive(Parser)]
#[command(name = "crrmon", about = "Cross-region replication monitoring provisioner")]
struct Cli {
    #[arg(long, value_enum, default_value_t = Backend::Aws, global = true)]
    backend: Backend,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Aws,
    /// In-process state only, for dry runs.
    Memory,
}

#[derive(Subcommand)]
enum Command {
    /// Process a single provisioning event.
    Handle {
        /// Event file, `-` for stdin.
        #[arg(long, default_value = "-")]
        event: String,

        /// Resource kind, overriding the event's ResourceType (trail-alarm or agent).
        #[arg(long)]
        resource: Option<MonitorResource>,

        /// Print the outcome without delivering it to the response URL.
        #[arg(long, default_value_t = false)]
        no_respond: bool,
    },
    /// Accept provisioning events over HTTP.
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(long, default_value = "8080")]
        port: u16,

        #[arg(long)]
        resource: Option<MonitorResource>,

        #[arg(long, default_value_t = false)]
        no_respond: bool,
    },
}

#[tokio::main]
async fn main() -> std::result::Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let env_filter = EnvFilter::from_default_env().add_directive("crrmon=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let settings = MonitorSettings::from_env();
    let services = match cli.backend {
        Backend::Aws => CloudServices::from_backend(Arc::new(AwsCloud::from_env().await)),
        Backend::Memory => {
            warn!("using in-memory backend, no cloud resources will be touched");
            CloudServices::from_backend(Arc::new(MemoryCloud::new()))
        }
    };
    let controller = Arc::new(ControllerSys::new(services, settings));

    match cli.command {
        Command::Handle {
            event,
            resource,
            no_respond,
        } => {
            let request = read_event(&event).await?;
            let state = AppState {
                controller,
                responder: (!no_respond).then(Responder::default),
                resource,
            };

            let (response, delivery) = dispatch(&state, &request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(match (response.status, delivery) {
                (ResponseStatus::Success, Ok(())) => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }
        Command::Serve {
            host,
            port,
            resource,
            no_respond,
        } => {
            let addr = format!("{host}:{port}");
            let app = invoke_router(AppState {
                controller,
                responder: (!no_respond).then(Responder::default),
                resource,
            });

            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("crrmon listening on {addr}");
            axum::serve(listener, app).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn read_event(source: &str) -> Result<ProvisioningRequest> {
    let raw = if source == "-" {
        let mut raw = String::new();
        tokio::io::stdin().read_to_string(&mut raw).await?;
        raw
    } else {
        tokio::fs::read_to_string(PathBuf::from(source)).await?
    };
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use crrmon_common::{CrrError, RequestType};

    use super::*;

    fn event_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("crrmon-{}-{name}.json", std::process::id()))
    }

    #[tokio::test]
    async fn event_file_is_parsed_into_request() {
        let path = event_path("delete");
        tokio::fs::write(
            &path,
            r#"{"RequestType": "Delete", "ResourceType": "Custom::CRRAgent"}"#,
        )
        .await
        .unwrap();

        let request = read_event(path.to_str().unwrap()).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(request.request_type, RequestType::Delete);
        assert_eq!(request.resource_type.as_deref(), Some("Custom::CRRAgent"));
    }

    #[tokio::test]
    async fn unreadable_event_file_is_an_io_error() {
        let err = read_event(event_path("missing").to_str().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, CrrError::Io(_)));
        assert_eq!(err.kind(), "InternalError");
    }

    #[tokio::test]
    async fn malformed_event_is_a_json_error() {
        let path = event_path("malformed");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = read_event(path.to_str().unwrap()).await.unwrap_err();
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(matches!(err, CrrError::Json(_)));
    }
}
