//! Sincronização de repositórios via libgit2 e plano de mudanças.
//!
//! O [`RepoSync`] clona um repositório quando o destino não existe e, caso
//! contrário, faz fetch e fast-forward da branch atual.

use anyhow::{Context, Result, bail};
use git2::build::CheckoutBuilder;
use git2::{Oid, Repository};
use std::path::Path;
use tracing::{debug, info};

/// Repositório local mantido em sincronia com um remoto.
pub struct RepoSync {
    repo: Repository,
}

impl RepoSync {
    /// Clona `url` em `dest` se o caminho não existir; senão atualiza o clone.
    pub fn clone_or_pull(url: &str, dest: &Path) -> Result<Self> {
        if dest.exists() {
            let repo = Repository::open(dest)
                .with_context(|| format!("failed to open git repository at {}", dest.display()))?;
            let sync = Self { repo };
            sync.pull()?;
            Ok(sync)
        } else {
            info!(url, dest = %dest.display(), "cloning repository");
            let repo = Repository::clone(url, dest)
                .with_context(|| format!("failed to clone {url}"))?;
            Ok(Self { repo })
        }
    }

    /// Faz fetch da branch atual em `origin` e avança por fast-forward.
    ///
    /// Históricos divergentes são um erro; nada é mesclado.
    pub fn pull(&self) -> Result<()> {
        let branch = self.current_branch()?;
        let mut remote = self
            .repo
            .find_remote("origin")
            .context("repository has no `origin` remote")?;
        remote
            .fetch(&[branch.as_str()], None, None)
            .with_context(|| format!("failed to fetch `{branch}`"))?;

        let fetch_head = self.repo.find_reference("FETCH_HEAD")?;
        let incoming = self.repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = self.repo.merge_analysis(&[&incoming])?;

        if analysis.is_up_to_date() {
            debug!(%branch, "already up to date");
            return Ok(());
        }
        if !analysis.is_fast_forward() {
            bail!("branch `{branch}` has diverged from origin; refusing to merge");
        }

        let refname = format!("refs/heads/{branch}");
        let mut reference = self.repo.find_reference(&refname)?;
        reference.set_target(incoming.id(), "asga: fast-forward")?;
        self.repo.set_head(&refname)?;
        self.repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
        info!(%branch, head = %incoming.id(), "fast-forwarded");
        Ok(())
    }

    /// Retorna o nome da branch atual.
    pub fn current_branch(&self) -> Result<String> {
        let head = self.repo.head()?;
        let name = head
            .shorthand()
            .context("branch name is not valid UTF-8")?
            .to_string();
        Ok(name)
    }

    pub fn head_id(&self) -> Result<Oid> {
        Ok(self.repo.head()?.peel_to_commit()?.id())
    }
}

/// Plano em markdown com as tags `refactor:` e `feature:`.
///
/// Quando `repo_path` é um repositório, o cabeçalho cita a branch e o commit.
pub fn plan_changes(repo_path: &Path) -> String {
    let mut plan = String::from("# Change plan\n\n");
    if let Ok(repo) = Repository::open(repo_path)
        && let Ok(head) = repo.head()
        && let Ok(commit) = head.peel_to_commit()
    {
        let id = commit.id().to_string();
        plan.push_str(&format!(
            "Base: {}@{}\n\n",
            head.shorthand().unwrap_or("HEAD"),
            &id[..7]
        ));
    }
    plan.push_str("- refactor: clean code\n");
    plan.push_str("- feature: add new endpoint\n");
    plan
}
