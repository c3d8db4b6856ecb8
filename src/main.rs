use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "graphmail", version, about = "Send mail through Microsoft Graph")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output structured JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send a message described by a JSON file
    Send(SendArgs),
    /// Send a short test message to one recipient
    TestEmail {
        /// Recipient address, optionally as "Name <addr>"
        #[arg(long)]
        to: String,
    },
    /// Verify the credentials can obtain an access token
    Probe,
    /// Show whether the configuration is complete
    Check,
}

#[derive(Debug, Args)]
struct SendArgs {
    /// Path to the message JSON file
    message: PathBuf,

    /// Host-selected delivery method; only `msgraph` is handled here
    #[arg(long, env = "EMAIL_DELIVERY_METHOD", default_value = "msgraph")]
    delivery_method: String,
}

/// Per-invocation settings layered over the `MSGRAPH_*` environment.
#[derive(Debug, Args)]
struct OverrideArgs {
    #[arg(long, global = true)]
    tenant_id: Option<String>,
    #[arg(long, global = true)]
    client_id: Option<String>,
    #[arg(long, global = true)]
    sender: Option<String>,
    #[arg(long, global = true)]
    sender_name: Option<String>,
    /// Do not keep a copy in the sender's Sent Items
    #[arg(long, global = true)]
    no_save_to_sent_items: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::dispatch(cli).await
}

mod commands {
    use std::sync::Arc;

    use anyhow::{anyhow, bail, Context, Result};
    use serde::Serialize;

    use graphmail::message::MessageFile;
    use graphmail::{
        ConnectionProbe, DeliveryMethodRegistry, GraphDelivery, GraphMailConfig, Mailbox,
        MailerSettings, OutgoingMessage, SettingsOverrides, TokenManager,
    };

    use super::{Cli, Commands, OverrideArgs, SendArgs};

    pub async fn dispatch(cli: Cli) -> Result<()> {
        let base = GraphMailConfig::from_env();
        let overrides = map_overrides(&cli.overrides);
        let tokens = Arc::new(TokenManager::new().context("build HTTP client")?);

        match cli.command {
            Commands::Send(args) => handle_send(args, base, overrides, tokens).await,
            Commands::TestEmail { to } => handle_test_email(&to, base, overrides, tokens).await,
            Commands::Probe => handle_probe(base.merged(&overrides), tokens, cli.json).await,
            Commands::Check => handle_check(&base.merged(&overrides), cli.json),
        }
    }

    async fn handle_send(
        args: SendArgs,
        base: GraphMailConfig,
        overrides: SettingsOverrides,
        tokens: Arc<TokenManager>,
    ) -> Result<()> {
        let message = MessageFile::load(&args.message)
            .with_context(|| format!("load message {}", args.message.display()))?;

        let mut registry = DeliveryMethodRegistry::new();
        registry.register(Box::new(GraphDelivery::new(base.merged(&overrides), tokens)));
        let selected = registry
            .reload(&MailerSettings {
                delivery_method: Some(args.delivery_method.clone()),
            })
            .context("select delivery method")?;
        if selected.is_none() {
            bail!(
                "delivery method '{}' is not handled by graphmail",
                args.delivery_method
            );
        }

        let method = registry
            .active()
            .ok_or_else(|| anyhow!("no active delivery method"))?;
        method
            .deliver(&message, &SettingsOverrides::default())
            .await
            .context("send message")?;
        println!("Sent to {}", message.recipient_summary());
        Ok(())
    }

    async fn handle_test_email(
        to: &str,
        base: GraphMailConfig,
        overrides: SettingsOverrides,
        tokens: Arc<TokenManager>,
    ) -> Result<()> {
        let recipient =
            Mailbox::parse(to).ok_or_else(|| anyhow!("invalid recipient address '{to}'"))?;
        let message = OutgoingMessage::test_message(recipient);

        GraphDelivery::new(base, tokens)
            .deliver(&message, &overrides)
            .await
            .context("send test email")?;
        println!("Test email sent to {}", message.recipient_summary());
        Ok(())
    }

    async fn handle_probe(config: GraphMailConfig, tokens: Arc<TokenManager>, json: bool) -> Result<()> {
        let result = ConnectionProbe::new(tokens).probe(&config).await;
        if json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if result.success {
            println!("Connection OK");
        } else {
            println!(
                "Connection failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }

        if result.success {
            Ok(())
        } else {
            Err(anyhow!("connection probe failed"))
        }
    }

    fn handle_check(config: &GraphMailConfig, json: bool) -> Result<()> {
        #[derive(Serialize)]
        struct CheckPayload<'a> {
            valid: bool,
            missing: Vec<String>,
            sender_email: &'a str,
            save_to_sent_items: bool,
        }

        let payload = CheckPayload {
            valid: config.is_valid(),
            missing: config.missing_fields(),
            sender_email: &config.sender_email,
            save_to_sent_items: config.save_to_sent_items,
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&payload)?);
        } else if payload.valid {
            println!("Configuration complete");
            println!("Sender: {}", payload.sender_email);
            println!("Save to Sent Items: {}", payload.save_to_sent_items);
        } else {
            println!("Configuration incomplete");
            for field in &payload.missing {
                println!("- missing {field}");
            }
        }
        Ok(())
    }

    fn map_overrides(args: &OverrideArgs) -> SettingsOverrides {
        SettingsOverrides {
            tenant_id: args.tenant_id.clone(),
            client_id: args.client_id.clone(),
            client_secret: None,
            sender_email: args.sender.clone(),
            sender_name: args.sender_name.clone(),
            save_to_sent_items: args.no_save_to_sent_items.then_some(false),
        }
    }
}
