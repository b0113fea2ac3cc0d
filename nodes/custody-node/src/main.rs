use clap::Parser;
use color_eyre::eyre::Result;
use custody_node::{Config, HttpArgs, LogArgs, RpcArgs};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path for a yaml-encoded signer config file
    config: std::path::PathBuf,
    /// Overrides the logging section of the config file
    #[clap(flatten)]
    log_args: LogArgs,
    /// Overrides the HTTP section of the config file
    #[clap(flatten)]
    http_args: HttpArgs,
    /// Overrides the RPC section of the config file
    #[clap(flatten)]
    rpc_args: RpcArgs,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let Args {
        config,
        log_args,
        http_args,
        rpc_args,
    } = Args::parse();
    let config = serde_yaml::from_reader::<_, Config>(std::fs::File::open(config)?)?
        .update_from_args(log_args, http_args, rpc_args)?;

    let _logging = custody_tracing::init(config.tracing.clone())?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(custody_node::run(config))
}
