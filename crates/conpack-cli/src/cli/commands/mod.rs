use super::args::*;

mod assemble;
mod common;
mod enrich;
mod plan;
mod run;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Plan(args) => plan::run(args).await,
        Command::Enrich(args) => enrich::run(args).await,
        Command::Assemble(args) => assemble::run(args).await,
        Command::Run(args) => run::run(args).await,
    }
}
