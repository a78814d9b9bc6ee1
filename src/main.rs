use clap::Parser;
use color_eyre::Result;
use lavafix::{
    Config, Database, Ledger, LedgerSettings, Profile,
    cli::{Cli, Commands},
    models::{ClientDraft, ClientPatch},
    views::HistoryFilter,
};

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev {
        Profile::Dev
    } else {
        Profile::Prod
    };

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path, &Config::default_database_path_for_profile(profile))?,
        None => Config::load_with_profile(profile)?,
    };

    let db_path = config.get_database_path();
    let db = Database::new(
        db_path.to_str()
            .ok_or_else(|| color_eyre::eyre::eyre!("Database path contains invalid UTF-8"))?
    )?;
    let mut ledger = Ledger::load(db, LedgerSettings::from(&config));

    // Dispatch to appropriate command handler
    match cli.command.unwrap_or(Commands::Summary) {
        Commands::Summary => lavafix::cli::handle_summary(&ledger, &config),
        Commands::AddClient { name, phone1, phone2, amount, image } => {
            let draft = ClientDraft {
                name,
                phone1,
                phone2,
                monthly_amount: amount,
                image,
            };
            lavafix::cli::handle_add_client(draft, &mut ledger)?;
        }
        Commands::EditClient {
            id,
            name,
            phone1,
            phone2,
            clear_phone2,
            amount,
            image,
            clear_image,
        } => {
            let patch = ClientPatch {
                name,
                phone1,
                phone2: if clear_phone2 { Some(None) } else { phone2.map(Some) },
                monthly_amount: amount,
                image: if clear_image { Some(None) } else { image.map(Some) },
            };
            lavafix::cli::handle_edit_client(&id, patch, &mut ledger)?;
        }
        Commands::DeleteClient { id, yes } => {
            lavafix::cli::handle_delete_client(&id, yes, &mut ledger)?;
        }
        Commands::Clients { search, sort, desc } => {
            lavafix::cli::handle_list_clients(&search, sort, desc, &ledger, &config);
        }
        Commands::Pending => lavafix::cli::handle_pending(&ledger, &config),
        Commands::Pay { id, notes } => {
            lavafix::cli::handle_pay(&id, notes, &mut ledger, &config)?;
        }
        Commands::Undo { id, yes } => {
            lavafix::cli::handle_undo(&id, yes, &mut ledger, &config)?;
        }
        Commands::ResetMonth { yes } => {
            lavafix::cli::handle_reset_month(yes, &mut ledger)?;
        }
        Commands::History { search, year, month } => {
            let filter = HistoryFilter { search, year, month };
            lavafix::cli::handle_history(&filter, &ledger, &config);
        }
        Commands::EditPayment {
            id,
            client_name,
            amount,
            date,
            notes,
            clear_notes,
        } => {
            let notes = if clear_notes { Some(None) } else { notes.map(Some) };
            lavafix::cli::handle_edit_payment(&id, client_name, amount, date, notes, &mut ledger)?;
        }
        Commands::DeletePayment { id, yes } => {
            lavafix::cli::handle_delete_payment(&id, yes, &mut ledger)?;
        }
        Commands::Notifications { limit } => lavafix::cli::handle_notifications(limit, &ledger),
        Commands::Backup { dir } => {
            lavafix::cli::handle_backup(dir, &ledger, &config)?;
        }
        Commands::Remind { id, all } => {
            lavafix::cli::handle_remind(id, all, &ledger, &config)?;
        }
    }

    Ok(())
}
