use crate::context::AppContext;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use fairhouse_core::Amount;
use fairhouse_session::{ApprovalOutcome, DepositOutcome};

#[derive(Subcommand)]
pub enum FundsCommands {
    /// Show wallet, ledger and locked balances
    Balance,
    /// Mint test tokens into the wallet (local house only)
    Mint {
        /// Amount in token units
        amount: Amount,
    },
    /// Approve the house to pull up to AMOUNT from the wallet
    Approve {
        amount: Amount,
    },
    /// Set the house allowance back to zero
    ResetAllowance,
    /// Move tokens from the wallet onto the ledger
    Deposit {
        amount: Amount,
    },
    /// Move tokens from the ledger back to the wallet
    Withdraw {
        amount: Amount,
    },
    /// Withdraw the whole ledger balance
    WithdrawAll {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_funds_command(cmd: FundsCommands, ctx: &AppContext) -> anyhow::Result<()> {
    let funds = ctx.funds().await?;

    match cmd {
        FundsCommands::Balance => {
            let wallet = funds.wallet_balance().await?;
            let allowance = funds.allowance().await?;
            let ledger = funds.ledger_balance().await?;
            let locked = funds.locked();

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Account", "Wallet", "Ledger", "Locked", "Allowance"]);
            table.add_row(vec![
                ctx.account.to_string(),
                wallet.to_string(),
                ledger.to_string(),
                locked.to_string(),
                allowance.to_string(),
            ]);
            println!("{table}");
        }

        FundsCommands::Mint { amount } => {
            ctx.house.mint(&ctx.account, amount).await?;
            println!("Minted {} to {}", amount, ctx.account);
        }

        FundsCommands::Approve { amount } => match funds.ensure_allowance(amount).await? {
            ApprovalOutcome::AlreadySufficient => println!("Allowance already covers {}", amount),
            ApprovalOutcome::Approved(receipt) => {
                println!("Approved {} (tx {})", amount, receipt.tx_hash)
            }
            ApprovalOutcome::NeedsReset { current } => {
                println!("Current allowance {} must be reset to 0 first.", current);
                println!("Run 'fairhouse funds reset-allowance', then approve again.");
            }
            ApprovalOutcome::Failed(reason) => anyhow::bail!("Approval failed: {}", reason),
        },

        FundsCommands::ResetAllowance => {
            let receipt = funds.reset_allowance().await?;
            println!("Allowance reset (tx {})", receipt.tx_hash);
        }

        FundsCommands::Deposit { amount } => match funds.deposit(amount).await? {
            DepositOutcome::Deposited { receipt, balance } => {
                println!("Deposited {} (tx {})", amount, receipt.tx_hash);
                if let Some(balance) = balance {
                    println!("Ledger balance: {}", balance);
                }
            }
            DepositOutcome::NeedsAllowanceReset { current } => {
                println!("The token will not raise a non-zero allowance ({}).", current);
                println!("Run 'fairhouse funds reset-allowance' and deposit again.");
            }
        },

        FundsCommands::Withdraw { amount } => {
            let receipt = funds.withdraw(amount).await?;
            println!("Withdrew {} (tx {})", amount, receipt.tx_hash);
        }

        FundsCommands::WithdrawAll { yes } => {
            if !yes {
                let confirm = Confirm::new()
                    .with_prompt("Withdraw the entire ledger balance?")
                    .default(false)
                    .interact()?;
                if !confirm {
                    println!("Withdrawal cancelled.");
                    return Ok(());
                }
            }
            let receipt = funds.withdraw_all().await?;
            let amount = receipt.returned.unwrap_or(Amount::ZERO);
            println!("Withdrew {} (tx {})", amount, receipt.tx_hash);
        }
    }

    Ok(())
}
