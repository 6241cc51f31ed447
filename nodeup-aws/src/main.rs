mod ansible;
mod create;
mod terraform;

use std::io;

use clap::{crate_version, Command};

const APP_NAME: &str = "nodeup-aws";

#[tokio::main]
async fn main() -> io::Result<()> {
    let matches = Command::new(APP_NAME)
        .version(crate_version!())
        .about("Validator node provisioner on AWS (requires terraform and ansible)")
        .subcommands(vec![create::command()])
        .get_matches();

    match matches.subcommand() {
        Some((create::NAME, sub_matches)) => {
            create::execute(
                &sub_matches
                    .get_one::<String>("LOG_LEVEL")
                    .unwrap_or(&String::from("info"))
                    .clone(),
                &sub_matches
                    .get_one::<String>("CLUSTER_NAME")
                    .unwrap()
                    .clone(),
            )
            .await
            .expect("failed to execute 'create'");
        }

        _ => unreachable!("unknown subcommand"),
    }

    Ok(())
}
