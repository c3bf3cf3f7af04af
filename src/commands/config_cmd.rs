use clap::{Args, Subcommand};

use super::OutputFormat;
use todosync::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        match &config.config_file {
                            Some(path) => println!("Config file: {}", path.display()),
                            None => println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            ),
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!("port: {}", config.port.value);
                        println!("  source: {}", config.port.source);
                        match &config.static_dir.value {
                            Some(dir) => println!("static_dir: {}", dir.display()),
                            None => println!("static_dir: (none)"),
                        }
                        println!("  source: {}", config.static_dir.source);
                        println!("owner: {}", config.owner.value);
                        println!("  source: {}", config.owner.source);
                    }
                }
                Ok(())
            }
        }
    }
}
