use crate::context::AppContext;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use fairhouse_core::Ledger;
use fairhouse_session::{
    house_commitment_preview, ConfiguredHouseSecret, HouseSecretSource, HOUSE_SEED_ENV,
};

#[derive(Subcommand)]
pub enum HouseCommands {
    /// Show owner, published commitment and rates
    Status,
    /// Print the commitment for a seed without publishing it
    Preview {
        /// Seed; `0x`-prefixed seeds are hex bytes. Defaults to the configured seed
        seed: Option<String>,
    },
    /// Publish the commitment of the configured house seed (owner only)
    Publish {
        #[arg(short, long)]
        yes: bool,
    },
    /// Set the house edge in basis points (owner only)
    SetEdge {
        bps: u32,
        #[arg(short, long)]
        yes: bool,
    },
    /// Set the protocol fee in basis points (owner only)
    SetFee {
        bps: u32,
    },
}

fn confirmed(prompt: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

pub async fn handle_house_command(cmd: HouseCommands, ctx: &AppContext) -> anyhow::Result<()> {
    match cmd {
        HouseCommands::Status => {
            let house = &ctx.house;
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Field", "Value"]);
            table.add_row(vec!["Address".to_string(), house.address().to_string()]);
            table.add_row(vec!["Owner".to_string(), house.owner().await?.to_string()]);
            table.add_row(vec![
                "House commitment".to_string(),
                house
                    .current_house_commitment()
                    .await?
                    .map_or_else(|| "unset".to_string(), |c| c.to_string()),
            ]);
            table.add_row(vec![
                "Edge (bps)".to_string(),
                house.house_edge_bps().await?.to_string(),
            ]);
            table.add_row(vec!["Fee (bps)".to_string(), house.fee_bps().await?.to_string()]);
            table.add_row(vec![
                "Block".to_string(),
                house.state().block_number.to_string(),
            ]);
            println!("{table}");
        }

        HouseCommands::Preview { seed } => {
            let commitment = match seed {
                Some(seed) => house_commitment_preview(&seed)?,
                None => ConfiguredHouseSecret::from_env()?.house_secret()?.commitment(),
            };
            println!("{}", commitment);
        }

        HouseCommands::Publish { yes } => {
            let operator = ctx.operator();
            operator.ensure_owner().await?;
            let source = ConfiguredHouseSecret::from_env()?;
            println!("Publishing the commitment of the seed in {}.", HOUSE_SEED_ENV);
            println!("Open sessions committed against the previous one can no longer settle.");
            if !confirmed("Publish new house commitment?", yes)? {
                println!("Cancelled.");
                return Ok(());
            }
            let commitment = operator.publish_commitment(&source).await?;
            println!("House commitment set to {}", commitment);
        }

        HouseCommands::SetEdge { bps, yes } => {
            let operator = ctx.operator();
            operator.ensure_owner().await?;
            if !confirmed(&format!("Set house edge to {} bps?", bps), yes)? {
                println!("Cancelled.");
                return Ok(());
            }
            operator.set_house_edge_bps(bps).await?;
            println!("House edge set to {} bps", bps);
        }

        HouseCommands::SetFee { bps } => {
            ctx.house.set_fee_bps(&ctx.account, bps).await?;
            println!("Fee set to {} bps", bps);
        }
    }

    Ok(())
}
