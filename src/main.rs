use anyhow::Context;
use clap::Parser;
use secrecy::ExposeSecret;
use std::path::PathBuf;
use tg_inbox_proxy::config::Overrides;
use tg_inbox_proxy::kafka::RecordFormat;
use tg_inbox_proxy::{Config, InboxProxy, ShutdownCoordinator};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "tg-inbox-proxy")]
#[command(about = "Forwards Telegram bot messages to Kafka", long_about = None)]
struct Args {
    #[arg(short, long, env = "TG_BOT_TOKEN", hide_env_values = true, help = "Telegram bot token")]
    token: Option<String>,

    #[arg(short, long, env = "KAFKA_BROKERS", help = "Kafka brokers list, comma-separated")]
    brokers: Option<String>,

    #[arg(short = 's', long, env = "DEFAULT_TOPIC", help = "Default topic for messages")]
    default_topic: Option<String>,

    #[arg(short = 'r', long, env = "BROKER_CONC_RETRIES", help = "Number of broker connection attempts")]
    broker_conn_retries: Option<u32>,

    #[arg(
        short = 'd',
        long,
        env = "BROKER_CONC_RETRY_TIMEOUT",
        help = "Delay between broker connection attempts in seconds"
    )]
    broker_conn_retry_timeout: Option<u64>,

    #[arg(short, long, value_name = "FILE", help = "Optional TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(short, long, value_name = "FORMAT", help = "Record wire format: protobuf or json")]
    format: Option<RecordFormat>,

    #[arg(short, long, value_name = "FILE", help = "Write records to a file instead of Kafka")]
    output_file: Option<PathBuf>,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            token: self.token.clone(),
            brokers: self.brokers.clone(),
            default_topic: self.default_topic.clone(),
            connect_retries: self.broker_conn_retries,
            connect_retry_delay_secs: self.broker_conn_retry_timeout,
            format: self.format,
            output_file: self.output_file.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting tg-inbox-proxy");

    let config = Config::load(args.config.as_deref())
        .context("failed to load configuration")?
        .apply(args.overrides());

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    info!(
        kafka_brokers = ?config.kafka.brokers,
        default_topic = %config.kafka.default_topic,
        broker_conn_retries = config.kafka.connect_retries,
        broker_conn_retry_delay_secs = config.kafka.connect_retry_delay_secs,
        format = ?config.pipeline.format,
        output_file = ?config.pipeline.output_file,
        token_set = !config.telegram.token.expose_secret().is_empty(),
        "Configuration summary"
    );

    let coordinator = ShutdownCoordinator::new(CancellationToken::new());
    coordinator.listen_for_signals();

    if let Err(e) = InboxProxy::new(config).run(coordinator).await {
        error!(error = %e, "exit reason");
        return Err(e.into());
    }

    info!("tg-inbox-proxy stopped");
    Ok(())
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("tg_inbox_proxy=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tg_inbox_proxy=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn env_of(id: &str) -> Option<String> {
        Args::command()
            .get_arguments()
            .find(|arg| arg.get_id() == id)
            .and_then(|arg| arg.get_env())
            .map(|env| env.to_string_lossy().into_owned())
    }

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_legacy_environment_names() {
        assert_eq!(env_of("token").as_deref(), Some("TG_BOT_TOKEN"));
        assert_eq!(env_of("brokers").as_deref(), Some("KAFKA_BROKERS"));
        assert_eq!(env_of("default_topic").as_deref(), Some("DEFAULT_TOPIC"));
        assert_eq!(env_of("broker_conn_retries").as_deref(), Some("BROKER_CONC_RETRIES"));
        assert_eq!(
            env_of("broker_conn_retry_timeout").as_deref(),
            Some("BROKER_CONC_RETRY_TIMEOUT")
        );
    }

    #[test]
    fn test_flags_become_overrides() {
        let args = Args::try_parse_from([
            "tg-inbox-proxy",
            "-t",
            "123:abc",
            "-b",
            "k1:9092,k2:9092",
            "-r",
            "7",
            "-d",
            "2",
            "-f",
            "json",
        ])
        .unwrap();

        let config = Config::default().apply(args.overrides());
        assert_eq!(config.kafka.brokers, vec!["k1:9092", "k2:9092"]);
        assert_eq!(config.kafka.connect_retries, 7);
        assert_eq!(config.kafka.connect_retry_delay_secs, 2);
        assert_eq!(config.pipeline.format, RecordFormat::Json);
    }
}
