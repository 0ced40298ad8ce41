//! Command implementations, one module per verb.

pub mod auth;
pub mod blocked;
pub mod close;
pub mod create;
pub mod delete;
pub mod dep;
pub mod export;
pub mod import;
pub mod init;
pub mod list;
pub mod migrate;
pub mod onboard;
pub mod ready;
pub mod show;
pub mod sync;
pub mod update;
pub mod whoami;

use crate::config::{self, CliOverrides, Config, LbPaths};
use crate::error::{LbError, Result};
use crate::model::{DependencyType, OutboxItem, OutboxOp};
use crate::outbox::DeferredRelation;
use crate::remote::RemoteClient;
use crate::storage::CacheDb;
use crate::sync::ResolvedTeam;
use crate::util::{self, time::humanize_age};
use chrono::Utc;
use std::io::IsTerminal;
use std::str::FromStr;

/// Everything a command needs: resolved paths, merged config, open cache.
pub struct CommandCtx {
    pub paths: LbPaths,
    pub config: Config,
    pub db: CacheDb,
}

/// Discover the repo, load configuration, open the cache.
pub fn open_ctx(team: Option<String>) -> Result<CommandCtx> {
    let paths = config::discover_paths()?;
    let config = config::load(&paths, CliOverrides { team_key: team })?;
    let db = CacheDb::open(&paths.db_path())?;
    Ok(CommandCtx { paths, config, db })
}

impl CommandCtx {
    /// Build the Remote client for this configuration.
    ///
    /// # Errors
    ///
    /// Returns `NoApiKey` when no credential is configured.
    pub fn client(&self) -> Result<RemoteClient> {
        RemoteClient::new(self.config.require_api_key()?)
    }

    /// Resolve the team (client + team + scope objects) for inline pushes.
    ///
    /// # Errors
    ///
    /// Propagates credential and Remote failures.
    pub fn resolve_team(&mut self) -> Result<(RemoteClient, ResolvedTeam)> {
        let client = self.client()?;
        let team = crate::sync::resolve_team(&client, &self.config, &mut self.db)?;
        self.db.set_meta("viewer_email", &team.viewer.email)?;
        Ok((client, team))
    }

    /// The viewer's email as last observed (whoami / any team resolution).
    #[must_use]
    pub fn viewer_email(&self) -> Option<String> {
        self.db.get_meta("viewer_email").ok().flatten()
    }

    /// Freshness for read commands: sync when stale, but degrade to the
    /// cache with a staleness notice when the Remote is unreachable.
    ///
    /// # Errors
    ///
    /// Propagates non-transient failures (storage, auth).
    pub fn ensure_fresh_tolerant(&mut self, force: bool) -> Result<()> {
        match crate::sync::ensure_fresh(&mut self.db, &self.config, &self.paths, force) {
            Ok(_) => Ok(()),
            Err(e) if e.is_transient() => {
                let age = self
                    .db
                    .last_sync()?
                    .map_or_else(|| "never synced".to_string(), |t| format!("{} old", humanize_age(t)));
                eprintln!("note: cache {age}, offline; serving local data");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Execute one operation inline with the worker's executor (`--sync`).
    ///
    /// # Errors
    ///
    /// Propagates executor failures.
    pub fn execute_inline(
        &mut self,
        client: &RemoteClient,
        team: &ResolvedTeam,
        op: OutboxOp,
        payload: serde_json::Value,
    ) -> Result<Vec<String>> {
        let item = OutboxItem {
            id: 0,
            op,
            payload,
            created_at: Utc::now(),
            retry_count: 0,
            last_error: None,
        };
        let touched =
            crate::worker::execute_item(&mut self.db, client, team, &self.config, &item)?;
        // Inline pushes may have enqueued propagation follow-ups; drain them
        // with the same executor so `--sync` leaves no surprise queue behind.
        let _ = crate::sync::push_outbox(&mut self.db, client, team, &self.config)?;
        Ok(touched)
    }

    /// Queue an operation and signal the worker (the default write path).
    ///
    /// # Errors
    ///
    /// Propagates storage and spawn failures.
    pub fn enqueue_and_signal(&mut self, op: OutboxOp, payload: serde_json::Value) -> Result<i64> {
        let id = self.db.enqueue(op, &payload)?;
        crate::worker::launcher::notify_worker(&self.paths)?;
        Ok(id)
    }

    /// Schedule the post-mutation JSONL export.
    pub fn request_export(&self) {
        crate::export::request_export(&self.paths);
    }
}

/// Parse the relation flags (and the legacy `--deps type:ID,...` form)
/// into deferred-relation records. Validation is eager: every identifier
/// must be well-formed before any side effect happens.
pub fn parse_relations(
    blocks: &[String],
    blocked_by: &[String],
    related: &[String],
    discovered_from: &[String],
    deps: Option<&str>,
) -> Result<Vec<DeferredRelation>> {
    let mut out = Vec::new();

    let mut push = |dep_type: DependencyType, target: &str, inverse: bool| -> Result<()> {
        util::validate_identifier(target)?;
        out.push(DeferredRelation {
            dep_type,
            target: target.to_string(),
            inverse,
        });
        Ok(())
    };

    for target in blocks {
        push(DependencyType::Blocks, target, false)?;
    }
    for target in blocked_by {
        // `--blocked-by T` is stored as `(T, id, blocks)`.
        push(DependencyType::Blocks, target, true)?;
    }
    for target in related {
        push(DependencyType::Related, target, false)?;
    }
    for target in discovered_from {
        push(DependencyType::DiscoveredFrom, target, false)?;
    }

    if let Some(deps) = deps {
        for spec in deps.split(',').filter(|s| !s.trim().is_empty()) {
            let Some((type_str, target)) = spec.trim().split_once(':') else {
                return Err(LbError::InvalidDepSpec {
                    spec: spec.to_string(),
                });
            };
            let dep_type = DependencyType::from_str(type_str.trim())?;
            push(dep_type, target.trim(), false)?;
        }
    }

    Ok(out)
}

/// Interactive confirmation for destructive actions; non-terminals
/// proceed only with `--force`.
pub fn confirm_or_force(prompt: &str, force: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(LbError::validation(
            "force",
            "refusing to proceed without --force in a non-interactive session",
        ));
    }
    eprint!("{prompt} [y/N] ");
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Pretty-print a serializable value for `-j` output.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Colour only when stdout is a terminal.
#[must_use]
pub fn use_color() -> bool {
    std::io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relations_orientations() {
        let rels = parse_relations(
            &["TEAM-1".to_string()],
            &["TEAM-2".to_string()],
            &[],
            &[],
            None,
        )
        .unwrap();
        assert_eq!(rels.len(), 2);
        assert!(!rels[0].inverse);
        assert!(rels[1].inverse);
        assert_eq!(rels[1].target, "TEAM-2");
    }

    #[test]
    fn test_parse_relations_legacy_deps() {
        let rels =
            parse_relations(&[], &[], &[], &[], Some("blocks:TEAM-1, related:TEAM-2")).unwrap();
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].dep_type, DependencyType::Blocks);
        assert_eq!(rels[1].dep_type, DependencyType::Related);
    }

    #[test]
    fn test_parse_relations_rejects_malformed() {
        assert!(parse_relations(&[], &[], &[], &[], Some("TEAM-1")).is_err());
        assert!(parse_relations(&[], &[], &[], &[], Some("blocks:notanid")).is_err());
        assert!(parse_relations(&["bad id".to_string()], &[], &[], &[], None).is_err());
    }
}
