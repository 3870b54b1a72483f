use crate::context::AppContext;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::{Password, Select};
use fairhouse_core::{Amount, SettlementKind};
use fairhouse_session::{
    MoveOutcome, RecoverOutcome, SessionEngine, SessionStatus, SettleOutcome, StartOutcome,
};

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Commit a fresh secret and open a session
    Start {
        /// First wager; defaults to the game's default wager
        wager: Option<Amount>,
    },
    /// Play moves in the open session
    Play {
        wager: Option<Amount>,
        /// Keep playing until this many wins or the first loss
        #[arg(short, long, default_value_t = 1)]
        steps: u32,
    },
    /// Reveal and settle every move on the ledger
    Settle {
        /// Also withdraw the whole balance to the wallet
        #[arg(short, long)]
        withdraw: bool,
    },
    /// Resume a session the ledger still holds
    Recover {
        /// Hex secret of the session, when it is not saved locally
        #[arg(short, long)]
        secret: Option<String>,
        /// Ask for the secret if it is needed
        #[arg(short, long)]
        prompt: bool,
    },
    /// Show the current session
    Status,
    /// Forget a session that is not open
    Reset,
    /// Play and settle from a menu
    Interactive {
        wager: Option<Amount>,
    },
}

pub async fn handle_session_command(
    cmd: SessionCommands,
    ctx: &AppContext,
) -> anyhow::Result<()> {
    let mut engine = ctx.engine().await?;
    let default_wager = ctx.session_config.default_wager;

    match cmd {
        SessionCommands::Start { wager } => {
            let wager = wager.unwrap_or(default_wager);
            match engine.start(wager).await? {
                StartOutcome::Committed {
                    commitment,
                    house_commitment,
                    tx_hash,
                } => {
                    println!("Session committed (tx {})", tx_hash);
                    println!("  Your commitment:  {}", commitment);
                    println!("  House commitment: {}", house_commitment);
                    println!("Play with 'fairhouse session play {}'", wager);
                }
                StartOutcome::AwaitingFunds { need, available } => {
                    println!("Not enough balance to start: need {}, have {}", need, available);
                    println!("Deposit with 'fairhouse funds deposit <amount>'");
                }
                StartOutcome::RecoveryNeeded => {
                    println!("The ledger already holds a session for {}.", ctx.account);
                    println!("Run 'fairhouse session recover' to resume it.");
                }
            }
        }

        SessionCommands::Play { wager, steps } => {
            resume(&mut engine).await?;
            let wager = wager.unwrap_or(default_wager);
            let round = engine.play_until(wager, steps).await?;
            for outcome in &round.moves {
                print_move(outcome);
            }
            if round.busted() {
                println!("Busted. Settle with 'fairhouse session settle'.");
            } else {
                println!(
                    "Cash-out estimate: {}",
                    engine.projected_return(wager, engine.session().steps())
                );
            }
        }

        SessionCommands::Settle { withdraw } => {
            resume(&mut engine).await?;
            settle(&mut engine, withdraw).await?;
        }

        SessionCommands::Recover { secret, prompt } => {
            let mut outcome = engine.recover(secret.as_deref()).await?;
            if let RecoverOutcome::ManualSecretRequired { .. } = outcome {
                if prompt {
                    let input = Password::new()
                        .with_prompt("Session secret (hex)")
                        .interact()?;
                    outcome = engine.recover(Some(&input)).await?;
                }
            }
            match outcome {
                RecoverOutcome::Resumed { status } | RecoverOutcome::Recovered { status, .. } => {
                    println!("Session resumed ({:?})", status);
                    print_session(&engine);
                }
                RecoverOutcome::NothingToRecover => println!("No session to recover."),
                RecoverOutcome::ManualSecretRequired { ledger_commitment } => {
                    println!("The ledger holds commitment {}", ledger_commitment);
                    println!("but no matching secret is saved on this device.");
                    println!("Re-run with --secret <hex> or --prompt.");
                }
            }
        }

        SessionCommands::Status => {
            resume(&mut engine).await?;
            print_session(&engine);
        }

        SessionCommands::Reset => {
            engine.reset()?;
            println!("Local session state cleared.");
        }

        SessionCommands::Interactive { wager } => {
            resume(&mut engine).await?;
            let wager = wager.unwrap_or(default_wager);
            interactive(&mut engine, wager).await?;
        }
    }

    Ok(())
}

/// Pick up a saved session, if any.
async fn resume(engine: &mut SessionEngine) -> anyhow::Result<()> {
    if engine.status() != SessionStatus::RecoveryNeeded {
        return Ok(());
    }
    if let RecoverOutcome::ManualSecretRequired { .. } = engine.recover(None).await? {
        println!("A session is open on the ledger without a saved secret.");
        println!("Run 'fairhouse session recover --prompt'.");
    }
    Ok(())
}

async fn settle(engine: &mut SessionEngine, withdraw: bool) -> anyhow::Result<()> {
    let kind = if withdraw {
        SettlementKind::RevealAndWithdraw
    } else {
        SettlementKind::Reveal
    };

    match engine.settle(kind).await? {
        SettleOutcome::Settled(settlement) => {
            println!(
                "Settled {} moves in block {} (tx {})",
                settlement.wagers.len(),
                settlement.block_number,
                settlement.tx_hash
            );
            match settlement.payout {
                Some(payout) => println!("  Payout: {}", payout),
                None => println!("  Payout: not reported; check the ledger balance"),
            }
            if let Some(balance) = settlement.balance {
                println!("  Ledger balance: {}", balance);
            }
        }
        SettleOutcome::NothingToSettle { balance } => {
            println!("No moves to settle.");
            if let Some(balance) = balance {
                println!("  Ledger balance: {}", balance);
            }
        }
    }
    Ok(())
}

async fn interactive(engine: &mut SessionEngine, wager: Amount) -> anyhow::Result<()> {
    if !engine.status().is_open() {
        match engine.start(wager).await? {
            StartOutcome::Committed { .. } => println!("Session committed."),
            other => {
                println!("Could not start a session: {:?}", other);
                return Ok(());
            }
        }
    }

    let poller = engine.spawn_balance_poller();
    let actions = ["Play", "Settle", "Settle and withdraw", "Quit"];

    loop {
        print_session(engine);
        let choice = Select::new()
            .with_prompt("Next")
            .items(&actions)
            .default(0)
            .interact()?;

        match choice {
            0 => match engine.play(wager).await {
                Ok(outcome) => print_move(&outcome),
                Err(e) => println!("Error: {}", e),
            },
            1 | 2 => {
                settle(engine, choice == 2).await?;
                break;
            }
            _ => {
                if engine.status().is_open() {
                    println!("Session left open; settle it later with 'fairhouse session settle'.");
                }
                break;
            }
        }
    }

    poller.abort();
    Ok(())
}

fn print_move(outcome: &MoveOutcome) {
    println!(
        "Move {}: wagered {} -> {} (locked {}, gain {})",
        outcome.index,
        outcome.wager,
        if outcome.won { "WIN" } else { "LOSS" },
        outcome.pending_spent,
        outcome.total_gain
    );
}

fn print_session(engine: &SessionEngine) {
    let session = engine.session();
    let snapshot = engine.view().snapshot();
    let show = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Game".to_string(), engine.config().game.clone()]);
    table.add_row(vec!["Account".to_string(), session.account().to_string()]);
    table.add_row(vec!["Status".to_string(), format!("{:?}", session.status())]);
    table.add_row(vec![
        "Commitment".to_string(),
        show(session.user_commitment().map(|c| c.to_string())),
    ]);
    table.add_row(vec![
        "House commitment".to_string(),
        show(session.captured_house_commitment().map(|c| c.to_string())),
    ]);
    table.add_row(vec!["Moves".to_string(), session.moves().len().to_string()]);
    table.add_row(vec!["Wins in a row".to_string(), session.steps().to_string()]);
    table.add_row(vec!["Locked".to_string(), session.pending_spent().to_string()]);
    table.add_row(vec!["Total gain".to_string(), session.total_gain().to_string()]);
    table.add_row(vec![
        "Ledger balance".to_string(),
        show(snapshot.balance.map(|b| b.to_string())),
    ]);
    table.add_row(vec!["Available".to_string(), snapshot.available().to_string()]);
    println!("{table}");
}
