//! Interface de linha de comando do ASGA baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, run, validate, sync)
//! e flags globais (--config, --max-attempts, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// ASGA — gera spec, testes e patch a partir de uma user story.
#[derive(Debug, Parser)]
#[command(name = "asga", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração (padrão: `asga.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Número máximo de tentativas de reparo.
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sobe o gateway HTTP (jobs, SSE, prompts).
    Serve {
        /// Endereço de escuta; sobrescreve `host` do arquivo.
        #[arg(long)]
        host: Option<String>,

        /// Porta de escuta; sobrescreve `port` do arquivo.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Executa o workflow localmente para uma user story.
    Run {
        /// A user story (ex.: "upload a file").
        user_story: String,
    },

    /// Valida um payload JSON contra um schema nomeado.
    Validate {
        /// Nome do schema (ex.: `spec`, `critique`).
        schema: String,

        /// Arquivo JSON com o payload.
        file: PathBuf,
    },

    /// Clona ou atualiza um repositório e imprime o plano de mudanças.
    Sync {
        /// URL (ou caminho) do repositório remoto.
        repo_url: String,

        /// Diretório local do clone.
        dest: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["asga", "run", "upload a file"]);
        match cli.command {
            Command::Run { user_story } => assert_eq!(user_story, "upload a file"),
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_serve_overrides() {
        let cli = Cli::parse_from(["asga", "serve", "--host", "0.0.0.0", "--port", "9000"]);
        match cli.command {
            Command::Serve { host, port } => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(9000));
            }
            _ => panic!("expected Serve command"),
        }
    }

    #[test]
    fn cli_parses_validate_subcommand() {
        let cli = Cli::parse_from(["asga", "validate", "spec", "payload.json"]);
        match cli.command {
            Command::Validate { schema, file } => {
                assert_eq!(schema, "spec");
                assert_eq!(file, PathBuf::from("payload.json"));
            }
            _ => panic!("expected Validate command"),
        }
    }

    #[test]
    fn cli_parses_sync_subcommand() {
        let cli = Cli::parse_from(["asga", "sync", "https://example.com/repo.git", "work/repo"]);
        match cli.command {
            Command::Sync { repo_url, dest } => {
                assert_eq!(repo_url, "https://example.com/repo.git");
                assert_eq!(dest, PathBuf::from("work/repo"));
            }
            _ => panic!("expected Sync command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "asga",
            "--config",
            "other.toml",
            "--max-attempts",
            "5",
            "--verbose",
            "serve",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.max_attempts, Some(5));
        assert_eq!(cli.config, Some(PathBuf::from("other.toml")));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
