//! Interface de terminal do ASGA — spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`RunProgress`] acompanha visualmente
//! a execução de um workflow no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::workflow::{Outcome, RunRecord, Stage, StageEvent};

/// Indicador visual de progresso para uma execução do workflow.
///
/// Exibe um spinner com o estágio corrente e mensagens coloridas para
/// sucesso (verde), falha (vermelho) e reparo (amarelo).
pub struct RunProgress {
    pb: ProgressBar,
    max_attempts: u32,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl RunProgress {
    /// Inicia o spinner com a user story e retorna a instância de progresso.
    pub fn start(user_story: &str, max_attempts: u32) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("{}: {user_story}", Stage::START));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            max_attempts,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Imprime o evento como uma linha JSON e move o spinner adiante.
    ///
    /// Estágios `critic` e `repair` ganham uma linha extra com a nota e o
    /// número da tentativa.
    pub fn stage(&self, event: &StageEvent) {
        match serde_json::to_string(event) {
            Ok(line) => self.pb.println(line),
            Err(err) => self.pb.println(format!("{}", self.red.apply_to(err))),
        }
        match event.stage {
            Stage::Critic => {
                let score = event
                    .delta
                    .get("critique")
                    .and_then(|c| c.get("score"))
                    .and_then(|s| s.as_f64())
                    .unwrap_or_default();
                self.pb.println(format!(
                    "  {} critic score {score:.2}",
                    self.dim.apply_to("·")
                ));
            }
            Stage::Repair => {
                let attempt = event
                    .delta
                    .get("attempts")
                    .and_then(|a| a.as_u64())
                    .unwrap_or_default();
                self.pb.println(format!(
                    "  {} Repair {attempt}/{}",
                    self.yellow.apply_to("↻"),
                    self.max_attempts
                ));
            }
            _ => {}
        }
        self.pb.set_message(format!("{} done", event.stage));
    }

    /// Finaliza o spinner e exibe o resultado final.
    pub fn complete(&self, outcome: Outcome) {
        self.pb.finish_and_clear();
        match outcome {
            Outcome::Passed => {
                println!("  {} Critique passed", self.green.apply_to("✓"));
            }
            Outcome::Exhausted => {
                println!(
                    "  {} Repair attempts exhausted ({})",
                    self.red.apply_to("✗"),
                    self.max_attempts
                );
            }
        }
    }

    /// Finaliza o spinner após um erro fatal.
    pub fn fail(&self, err: &dyn std::fmt::Display) {
        self.pb.finish_and_clear();
        println!("  {} Run failed: {err}", self.red.apply_to("✗"));
    }

    /// Imprime o registro da execução formatado em JSON com estilo colorido.
    pub fn print_record(&self, record: &RunRecord) {
        let style = match record.outcome {
            Outcome::Passed => &self.green,
            Outcome::Exhausted => &self.red,
        };
        println!();
        println!("{}", style.apply_to("─── Run Record ───"));
        match serde_json::to_string_pretty(record) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("{}", self.red.apply_to(err)),
        }
    }
}
