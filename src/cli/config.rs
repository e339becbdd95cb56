//! `shellcommand config` - inspect or create the settings file

use clap::{Args, Subcommand};

use shellcommand::settings::Settings;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the settings file location
    Path,
    /// Print the effective settings
    Show {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Write a settings file with the defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.action {
        ConfigAction::Path => {
            let path = Settings::default_path()
                .ok_or_else(|| anyhow::anyhow!("Could not determine the config directory"))?;
            println!("{}", path.display());
        }
        ConfigAction::Show { json } => {
            let settings = Settings::load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                print!("{}", settings.to_toml()?);
            }
        }
        ConfigAction::Init { force } => {
            let path = Settings::default_path()
                .ok_or_else(|| anyhow::anyhow!("Could not determine the config directory"))?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Settings file already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            let path = Settings::default().save()?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}
