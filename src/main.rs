use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use fomo_wall::{
    actions::{
        TransactionSubmitter,
        prepare_send_message,
        prepare_set_invite_code,
    },
    app::{
        App,
        RunState,
        json_rpc_source::{
            JsonRpcSource,
            JsonRpcSubmitter,
        },
    },
    codec::{
        self,
        InviteToken,
    },
    config::{
        AppConfig,
        DEFAULT_CHAIN_ID,
        DEFAULT_RPC_URL,
    },
    events::Address,
    logging::init_tracing,
    snapshot::format_ether,
    status::{
        read_account_status,
        read_round_status,
    },
};
use itertools::Itertools;
use std::{
    path::PathBuf,
    time::Duration,
};
use url::Url;

const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);
const RECEIPT_POLL: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(
    name = "fomo-wall",
    version,
    about = "Follow and play a last-message-wins round from the terminal",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, env = "FOMO_RPC_URL", default_value = DEFAULT_RPC_URL, global = true)]
    rpc_url: Url,

    #[arg(long, env = "FOMO_CONTRACT_ADDRESS", global = true)]
    contract: Option<Address>,

    #[arg(long, env = "FOMO_CHAIN_ID", default_value_t = DEFAULT_CHAIN_ID, global = true)]
    chain_id: u64,

    /// Invite code used by `send` when none is given
    #[arg(long, env = "FOMO_DEFAULT_INVITE_CODE", default_value = "", global = true)]
    invite_code: String,

    /// Account to show referral state for and to send from
    #[arg(long, global = true)]
    account: Option<Address>,

    /// Write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow the round until interrupted
    Watch {
        /// Print snapshots as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Post a message, paying the entrance fee
    Send {
        text: String,
        /// Referrer address or invite code (first message only)
        #[arg(long)]
        invite: Option<String>,
        /// Wait for the transaction receipt
        #[arg(long)]
        wait: bool,
    },
    /// Register your own invite code
    SetInviteCode { code: String },
    /// Show referral state of an account
    Account { address: Address },
    /// Encode an address or text into an invite token
    Encode { input: String },
    /// Decode a text invite token
    Decode { token: InviteToken },
}

async fn handle_interupt() {
    match tokio::signal::ctrl_c().await {
        Ok(_) => tracing::info!("Received interrupt, exiting"),
        Err(_) => tracing::warn!("Received interrupt error, exiting anyway"),
    }
}

impl Cli {
    fn app_config(&self) -> Result<AppConfig> {
        let contract = self
            .contract
            .ok_or_else(|| eyre!("no contract configured; pass --contract or set FOMO_CONTRACT_ADDRESS"))?;
        let mut config = AppConfig::new(self.rpc_url.clone(), contract);
        config.chain_id = self.chain_id;
        config.account = self.account;
        config.default_invite_code = self.invite_code.clone();
        config.validate().wrap_err("invalid configuration")?;
        Ok(config)
    }
}

async fn connect(config: &AppConfig) -> Result<JsonRpcSource> {
    let source = JsonRpcSource::connect(config).wrap_err("creating rpc client")?;
    match source.chain_id().await {
        Ok(chain_id) if chain_id != config.chain_id => tracing::warn!(
            expected = config.chain_id,
            actual = chain_id,
            "node is on a different chain"
        ),
        Ok(_) => {}
        Err(err) => tracing::warn!(?err, "could not read chain id"),
    }
    Ok(source)
}

fn submitter(source: &JsonRpcSource, config: &AppConfig) -> Result<JsonRpcSubmitter> {
    let from = config
        .account
        .ok_or_else(|| eyre!("sending requires --account"))?;
    Ok(JsonRpcSubmitter::new(
        source.client().clone(),
        config.contract,
        from,
    ))
}

async fn watch(config: AppConfig, json: bool) -> Result<()> {
    let source = connect(&config).await?;
    let mut app = App::start(source, &config).await;
    let mut last_printed = None;
    tracing::info!("Watching round");
    let interrupt = handle_interupt();
    tokio::pin!(interrupt);
    loop {
        match app.run(&mut interrupt).await? {
            RunState::Continue => {
                let snapshot = app.snapshot();
                if last_printed.as_ref() == Some(&snapshot) {
                    continue;
                }
                if json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                } else {
                    print!("\x1b[2J\x1b[H{snapshot}");
                    if !snapshot.my_messages.is_empty() {
                        println!(
                            "mine: {}",
                            snapshot.my_messages.iter().map(|line| &line.text).join(" | ")
                        );
                    }
                }
                last_printed = Some(snapshot);
            }
            RunState::Exit => return Ok(()),
        }
    }
}

async fn send(config: AppConfig, text: String, invite: Option<String>, wait: bool) -> Result<()> {
    let source = connect(&config).await?;
    let submitter = submitter(&source, &config)?;
    let round = read_round_status(&source)
        .await
        .wrap_err("reading entrance fee")?;
    let invite = invite.unwrap_or_else(|| config.default_invite_code.clone());
    let call = prepare_send_message(&text, &invite, config.account.as_ref(), Some(round.entrance_fee))?;
    println!("sending '{text}' for {}", format_ether(call.value));
    let hash = submitter.submit(&call).await.map_err(|err| {
        tracing::error!(%err, "sendMessage failed");
        err
    })?;
    println!("submitted {hash}");
    if wait {
        let block = submitter
            .wait_for_receipt(hash, RECEIPT_TIMEOUT, RECEIPT_POLL)
            .await?;
        println!("mined in block {block}");
    }
    Ok(())
}

async fn set_invite_code(config: AppConfig, code: String) -> Result<()> {
    let source = connect(&config).await?;
    let submitter = submitter(&source, &config)?;
    let call = prepare_set_invite_code(&code)?;
    let hash = submitter.submit(&call).await.map_err(|err| {
        tracing::error!(%err, "setInviteCode failed");
        err
    })?;
    println!("submitted {hash}");
    Ok(())
}

async fn show_account(config: AppConfig, address: Address) -> Result<()> {
    let source = connect(&config).await?;
    let status = read_account_status(&source, address)
        .await
        .wrap_err_with(|| format!("reading account {address}"))?;
    println!("account        {address}");
    println!("balance        {}", format_ether(status.balance));
    println!("invite code    '{}'", status.invite_code);
    println!("invitees       {}", status.invitee_count);
    println!("referral paid  {}", format_ether(status.referral_rewards));
    println!("has access     {}", status.has_access);
    println!("visible pot    {}", format_ether(status.visible_pot));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref());

    match cli.command {
        Commands::Encode { ref input } => {
            println!("{}", codec::encode(input)?);
            Ok(())
        }
        Commands::Decode { ref token } => {
            println!("{}", codec::try_decode(token)?);
            Ok(())
        }
        Commands::Watch { json } => watch(cli.app_config()?, json).await,
        Commands::Send {
            ref text,
            ref invite,
            wait,
        } => send(cli.app_config()?, text.clone(), invite.clone(), wait).await,
        Commands::SetInviteCode { ref code } => {
            set_invite_code(cli.app_config()?, code.clone()).await
        }
        Commands::Account { address } => show_account(cli.app_config()?, address).await,
    }
}
