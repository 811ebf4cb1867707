//! Read-only share links to a workspace.
//!
//! A link is addressed by a short random token. It can expire, be revoked
//! and carry an argon2-hashed password; every successful open is counted
//! and logged with the visitor's address and user agent.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::{Rng, RngCore};
use rusqlite::{Connection, OptionalExtension, params};

use crate::db::now_us;
use crate::error::{CoreError, Entity, Result};
use crate::model::{
    NewShareLink, PasswordChange, ShareAccess, ShareLink, ShareLinkId, ShareLinkUpdate,
    ShareStats, Visitor, WorkspaceId,
};
use crate::workspaces;

/// Token alphabet without look-alike characters (no `0`, `1`, `I`, `O`).
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const TOKEN_LEN: usize = 8;
const TOKEN_ATTEMPTS: usize = 10;

/// Access log entries returned when the caller does not ask for a limit.
pub const DEFAULT_LOG_LIMIT: usize = 50;

/// Draw one candidate token.
#[must_use]
pub fn generate_token<R: Rng>(rng: &mut R) -> String {
    (0..TOKEN_LEN)
        .map(|_| char::from(TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())]))
        .collect()
}

fn hash_password<R: RngCore>(rng: &mut R, password: &str) -> Result<String> {
    let mut salt = [0_u8; 16];
    rng.fill_bytes(&mut salt);
    let salt =
        SaltString::encode_b64(&salt).map_err(|err| CoreError::Credential(err.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| CoreError::Credential(err.to_string()))?;
    Ok(hash.to_string())
}

fn password_matches(stored: &str, password: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|err| CoreError::Credential(err.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn token_taken(conn: &Connection, token: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM share_links WHERE token = ?1)",
        params![token],
        |row| row.get(0),
    )?)
}

/// Create a share link using the thread-local generator.
///
/// # Errors
///
/// See [`create_with`].
pub fn create(conn: &Connection, request: &NewShareLink) -> Result<ShareLink> {
    create_with(conn, request, &mut rand::thread_rng())
}

/// Create a share link, drawing its token and password salt from `rng`.
///
/// # Errors
///
/// - [`CoreError::Validation`] if no workspace is named.
/// - [`CoreError::NotFound`] if the workspace does not exist.
/// - [`CoreError::Conflict`] if no free token was found.
/// - [`CoreError::Credential`] if the password could not be hashed.
pub fn create_with<R: Rng>(
    conn: &Connection,
    request: &NewShareLink,
    rng: &mut R,
) -> Result<ShareLink> {
    let workspace = request
        .workspace_id
        .ok_or_else(|| CoreError::Validation("workspace_id is required".into()))?;
    workspaces::require(conn, workspace)?;

    let mut token = None;
    for _ in 0..TOKEN_ATTEMPTS {
        let candidate = generate_token(rng);
        if !token_taken(conn, &candidate)? {
            token = Some(candidate);
            break;
        }
    }
    let token = token.ok_or_else(|| {
        CoreError::Conflict(format!("no free share token after {TOKEN_ATTEMPTS} attempts"))
    })?;

    let password_hash = match request.password.as_deref() {
        None | Some("") => None,
        Some(password) => Some(hash_password(rng, password)?),
    };
    let now = now_us();
    conn.execute(
        "INSERT INTO share_links (
            token, workspace_id, created_by, created_at_us, expires_at_us, password_hash
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            token,
            workspace,
            request.created_by,
            now,
            request.expiration.expires_at(now),
            password_hash,
        ],
    )?;
    let id = ShareLinkId(conn.last_insert_rowid());
    tracing::info!(
        share_link = %id,
        workspace = %workspace,
        expiration = %request.expiration,
        protected = password_hash.is_some(),
        "created share link"
    );
    get(conn, id)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find(conn: &Connection, id: ShareLinkId) -> Result<Option<ShareLink>> {
    let sql = format!(
        "SELECT {} FROM share_links WHERE share_link_id = ?1",
        ShareLink::COLUMNS
    );
    Ok(conn.query_row(&sql, params![id], ShareLink::from_row).optional()?)
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if the link does not exist.
pub fn get(conn: &Connection, id: ShareLinkId) -> Result<ShareLink> {
    find(conn, id)?.ok_or_else(|| CoreError::not_found(Entity::ShareLink, id))
}

/// The link behind `token` if it is active and not expired at `now`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_open_by_token(
    conn: &Connection,
    token: &str,
    now: i64,
) -> Result<Option<ShareLink>> {
    let sql = format!(
        "SELECT {} FROM share_links
         WHERE token = ?1 AND is_active = 1
           AND (expires_at_us IS NULL OR expires_at_us > ?2)",
        ShareLink::COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![token, now], ShareLink::from_row)
        .optional()?)
}

/// Whether `password` unlocks the link behind `token`. Links without a
/// password, and unknown tokens, never match.
///
/// # Errors
///
/// Returns [`CoreError::Credential`] if the stored hash cannot be parsed.
pub fn verify_password(conn: &Connection, token: &str, password: &str) -> Result<bool> {
    let stored: Option<Option<String>> = conn
        .query_row(
            "SELECT password_hash FROM share_links WHERE token = ?1",
            params![token],
            |row| row.get(0),
        )
        .optional()?;
    match stored.flatten() {
        Some(hash) => password_matches(&hash, password),
        None => Ok(false),
    }
}

/// Count a visit and append it to the access log.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if the link does not exist.
pub fn log_access(conn: &Connection, id: ShareLinkId, visitor: &Visitor) -> Result<ShareAccess> {
    let now = now_us();
    let changed = conn.execute(
        "UPDATE share_links SET access_count = access_count + 1, last_accessed_at_us = ?1
         WHERE share_link_id = ?2",
        params![now, id],
    )?;
    if changed == 0 {
        return Err(CoreError::not_found(Entity::ShareLink, id));
    }
    conn.execute(
        "INSERT INTO share_access_logs (
            share_link_id, visitor_ip, visitor_user_agent, accessed_at_us
         ) VALUES (?1, ?2, ?3, ?4)",
        params![id, visitor.ip, visitor.user_agent, now],
    )?;
    let log = conn.last_insert_rowid();
    let sql = format!(
        "SELECT {} FROM share_access_logs WHERE log_id = ?1",
        ShareAccess::COLUMNS
    );
    Ok(conn.query_row(&sql, params![log], ShareAccess::from_row)?)
}

/// Open a link as a visitor: the token must be open at `now` and, for a
/// protected link, `password` must match. The visit is logged.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if no open link has this token.
/// - [`CoreError::AccessDenied`] if the password is missing or wrong.
pub fn open(
    conn: &Connection,
    token: &str,
    password: Option<&str>,
    visitor: &Visitor,
    now: i64,
) -> Result<ShareLink> {
    let link = find_open_by_token(conn, token, now)?
        .ok_or_else(|| CoreError::not_found(Entity::ShareLink, token))?;
    if link.has_password {
        let unlocked = match password {
            Some(password) => verify_password(conn, token, password)?,
            None => false,
        };
        if !unlocked {
            tracing::warn!(share_link = %link.id, "share link opened with a bad password");
            return Err(CoreError::AccessDenied(format!(
                "share link {token} needs its password"
            )));
        }
    }
    log_access(conn, link.id, visitor)?;
    get(conn, link.id)
}

/// Links of a workspace, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_for_workspace(
    conn: &Connection,
    workspace: WorkspaceId,
) -> Result<Vec<ShareLink>> {
    let sql = format!(
        "SELECT {} FROM share_links WHERE workspace_id = ?1
         ORDER BY created_at_us DESC, share_link_id DESC",
        ShareLink::COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![workspace], ShareLink::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Apply a partial update. A new expiration counts from now.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if the link does not exist.
/// - [`CoreError::Credential`] if a new password could not be hashed.
pub fn update(conn: &Connection, id: ShareLinkId, change: &ShareLinkUpdate) -> Result<ShareLink> {
    update_with(conn, id, change, &mut rand::thread_rng())
}

fn update_with<R: Rng>(
    conn: &Connection,
    id: ShareLinkId,
    change: &ShareLinkUpdate,
    rng: &mut R,
) -> Result<ShareLink> {
    get(conn, id)?;
    if let Some(expiration) = change.expiration {
        conn.execute(
            "UPDATE share_links SET expires_at_us = ?1 WHERE share_link_id = ?2",
            params![expiration.expires_at(now_us()), id],
        )?;
    }
    if let Some(active) = change.is_active {
        conn.execute(
            "UPDATE share_links SET is_active = ?1 WHERE share_link_id = ?2",
            params![active, id],
        )?;
    }
    let password_hash = match &change.password {
        PasswordChange::Keep => None,
        PasswordChange::Clear => Some(None),
        PasswordChange::Set(password) if password.is_empty() => Some(None),
        PasswordChange::Set(password) => Some(Some(hash_password(rng, password)?)),
    };
    if let Some(hash) = password_hash {
        conn.execute(
            "UPDATE share_links SET password_hash = ?1 WHERE share_link_id = ?2",
            params![hash, id],
        )?;
    }
    tracing::debug!(share_link = %id, "updated share link");
    get(conn, id)
}

/// Returns whether a link was removed. Its access log goes with it.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete(conn: &Connection, id: ShareLinkId) -> Result<bool> {
    let removed = conn.execute("DELETE FROM share_links WHERE share_link_id = ?1", params![id])?;
    Ok(removed > 0)
}

/// Most recent visits first, at most `limit` ([`DEFAULT_LOG_LIMIT`] when
/// `None`).
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if the link does not exist.
pub fn access_logs(
    conn: &Connection,
    id: ShareLinkId,
    limit: Option<usize>,
) -> Result<Vec<ShareAccess>> {
    get(conn, id)?;
    let limit = i64::try_from(limit.unwrap_or(DEFAULT_LOG_LIMIT)).unwrap_or(i64::MAX);
    let sql = format!(
        "SELECT {} FROM share_access_logs WHERE share_link_id = ?1
         ORDER BY accessed_at_us DESC, log_id DESC LIMIT ?2",
        ShareAccess::COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![id, limit], ShareAccess::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`CoreError::NotFound`] if the link does not exist.
pub fn stats(conn: &Connection, id: ShareLinkId) -> Result<ShareStats> {
    let link = get(conn, id)?;
    let (unique_visitors, total_visits) = conn.query_row(
        "SELECT COUNT(DISTINCT visitor_ip), COUNT(*) FROM share_access_logs
         WHERE share_link_id = ?1",
        params![id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(ShareStats {
        access_count: link.access_count,
        created_at_us: link.created_at_us,
        last_accessed_at_us: link.last_accessed_at_us,
        unique_visitors,
        total_visits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Expiry;
    use crate::test_support::Fixture;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn visitor(ip: &str) -> Visitor {
        Visitor {
            ip: Some(ip.into()),
            user_agent: Some("curl/8".into()),
        }
    }

    #[test]
    fn tokens_use_the_unambiguous_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let token = generate_token(&mut rng);
            assert_eq!(token.len(), TOKEN_LEN);
            assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)), "{token}");
        }
    }

    #[test]
    fn create_requires_an_existing_workspace() {
        let fx = Fixture::new();
        let err = create(&fx.conn, &NewShareLink::default()).expect_err("no workspace");
        assert!(matches!(err, CoreError::Validation(_)));
        let missing = NewShareLink::new(WorkspaceId(404));
        let err = create(&fx.conn, &missing).expect_err("missing workspace");
        assert!(matches!(err, CoreError::NotFound { entity: Entity::Workspace, .. }));
    }

    #[test]
    fn colliding_tokens_are_redrawn() {
        let fx = Fixture::new();
        let request = NewShareLink::new(fx.ws);
        let first = create_with(&fx.conn, &request, &mut StdRng::seed_from_u64(1)).expect("first");
        // Same seed draws the same first candidate, which is now taken.
        let second = create_with(&fx.conn, &request, &mut StdRng::seed_from_u64(1)).expect("again");
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn expired_and_revoked_links_are_closed() {
        let fx = Fixture::new();
        let mut request = NewShareLink::new(fx.ws);
        request.expiration = Expiry::OneHour;
        let link = create(&fx.conn, &request).expect("create");
        let expires = link.expires_at_us.expect("expiry");

        assert!(find_open_by_token(&fx.conn, &link.token, expires - 1).expect("q").is_some());
        assert_eq!(find_open_by_token(&fx.conn, &link.token, expires).expect("q"), None);

        let revoke = ShareLinkUpdate {
            is_active: Some(false),
            ..ShareLinkUpdate::default()
        };
        update(&fx.conn, link.id, &revoke).expect("revoke");
        assert_eq!(find_open_by_token(&fx.conn, &link.token, 0).expect("q"), None);
    }

    #[test]
    fn passwords_are_hashed_and_clearable() {
        let fx = Fixture::new();
        let mut request = NewShareLink::new(fx.ws);
        request.password = Some("hunter2".into());
        let link = create(&fx.conn, &request).expect("create");
        assert!(link.has_password);

        let stored: String = fx
            .conn
            .query_row(
                "SELECT password_hash FROM share_links WHERE share_link_id = ?1",
                params![link.id],
                |row| row.get(0),
            )
            .expect("hash");
        assert!(stored.starts_with("$argon2"));
        assert!(verify_password(&fx.conn, &link.token, "hunter2").expect("verify"));
        assert!(!verify_password(&fx.conn, &link.token, "hunter3").expect("verify"));

        let clear = ShareLinkUpdate {
            password: PasswordChange::from_input(Some("")),
            ..ShareLinkUpdate::default()
        };
        let cleared = update(&fx.conn, link.id, &clear).expect("clear");
        assert!(!cleared.has_password);
        assert!(!verify_password(&fx.conn, &link.token, "hunter2").expect("verify"));
    }

    #[test]
    fn open_checks_password_and_logs_the_visit() {
        let fx = Fixture::new();
        let mut request = NewShareLink::new(fx.ws);
        request.password = Some("s3cret".into());
        let link = create(&fx.conn, &request).expect("create");

        let err = open(&fx.conn, &link.token, None, &visitor("10.0.0.1"), now_us())
            .expect_err("no password");
        assert!(matches!(err, CoreError::AccessDenied(_)));
        let err = open(&fx.conn, &link.token, Some("nope"), &visitor("10.0.0.1"), now_us())
            .expect_err("wrong password");
        assert!(matches!(err, CoreError::AccessDenied(_)));
        let err = open(&fx.conn, "ZZZZZZZZ", None, &visitor("10.0.0.1"), now_us())
            .expect_err("unknown token");
        assert!(matches!(err, CoreError::NotFound { entity: Entity::ShareLink, .. }));

        let opened = open(&fx.conn, &link.token, Some("s3cret"), &visitor("10.0.0.1"), now_us())
            .expect("open");
        assert_eq!(opened.access_count, 1);
        assert!(opened.last_accessed_at_us.is_some());
    }

    #[test]
    fn stats_count_distinct_visitors() {
        let fx = Fixture::new();
        let link = create(&fx.conn, &NewShareLink::new(fx.ws)).expect("create");
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.1"] {
            log_access(&fx.conn, link.id, &visitor(ip)).expect("log");
        }

        let stats = stats(&fx.conn, link.id).expect("stats");
        assert_eq!(stats.access_count, 3);
        assert_eq!(stats.total_visits, 3);
        assert_eq!(stats.unique_visitors, 2);

        let recent = access_logs(&fx.conn, link.id, Some(2)).expect("logs");
        assert_eq!(recent.len(), 2);
        assert!(recent[0].id > recent[1].id);
        assert_eq!(access_logs(&fx.conn, link.id, None).expect("all").len(), 3);
    }

    #[test]
    fn delete_removes_link_and_log() {
        let fx = Fixture::new();
        let link = create(&fx.conn, &NewShareLink::new(fx.ws)).expect("create");
        log_access(&fx.conn, link.id, &Visitor::default()).expect("log");

        assert!(delete(&fx.conn, link.id).expect("delete"));
        assert!(!delete(&fx.conn, link.id).expect("again"));
        let logs: i64 = fx
            .conn
            .query_row("SELECT COUNT(*) FROM share_access_logs", [], |row| row.get(0))
            .expect("count");
        assert_eq!(logs, 0);
    }

    #[test]
    fn links_list_newest_first() {
        let fx = Fixture::new();
        let older = create(&fx.conn, &NewShareLink::new(fx.ws)).expect("older");
        let newer = create(&fx.conn, &NewShareLink::new(fx.ws)).expect("newer");
        let listed: Vec<_> = list_for_workspace(&fx.conn, fx.ws)
            .expect("list")
            .into_iter()
            .map(|link| link.id)
            .collect();
        assert_eq!(listed, vec![newer.id, older.id]);
    }
}
