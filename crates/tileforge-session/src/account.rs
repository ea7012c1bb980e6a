//! The account store: registration, login and password hashing.
//!
//! Passwords are stored as PBKDF2-HMAC-SHA256 hashes with a per-account
//! random salt, both base64 encoded. Older account files may still carry
//! a plaintext `password`; such an account is migrated to a hash on its
//! first successful login and the plaintext is cleared.
//!
//! Key derivation is slow on purpose, so the store never runs it while a
//! caller holds it. Registration takes a [`Credential`] derived up front;
//! login copies a [`LoginCheck`] out, verifies it on its own, and hands
//! the [`VerifiedLogin`] back to [`AccountStore::complete_login`].

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::SessionError;

/// PBKDF2 iteration count for new hashes.
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Access level given to new accounts and to out-of-range stored values.
pub const DEFAULT_ACCESS_LEVEL: i32 = 5;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Clamps a stored access level into `1..=5`.
///
/// The name `admin` (any case) is always level 1.
pub fn normalize_access_level(name: &str, level: i32) -> i32 {
    if name.eq_ignore_ascii_case("admin") {
        return 1;
    }
    if (1..=5).contains(&level) {
        level
    } else {
        DEFAULT_ACCESS_LEVEL
    }
}

/// One persisted account. Empty strings mean "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
///
/// Files written by the older server use PascalCase keys; those load
/// through the aliases and are rewritten in camelCase on the next save.
pub struct Account {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "PasswordHash")]
    pub password_hash: String,
    #[serde(alias = "Salt")]
    pub salt: String,
    /// Legacy plaintext credential, cleared on upgrade.
    #[serde(alias = "Password")]
    pub password: String,
    #[serde(alias = "AccessLevel")]
    pub access_level: i32,
    #[serde(alias = "Appearance")]
    pub appearance: String,
}

impl Account {
    fn has_hash(&self) -> bool {
        !self.password_hash.trim().is_empty() && !self.salt.trim().is_empty()
    }

    fn has_plaintext(&self) -> bool {
        !self.password.trim().is_empty()
    }
}

/// A freshly salted hash, ready to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    hash: String,
    salt: String,
}

impl Credential {
    /// Draws a salt and runs PBKDF2. This is the slow part.
    pub fn derive(password: &str, rounds: u32) -> Self {
        let (hash, salt) = hash_new(password, rounds.max(1));
        Self { hash, salt }
    }
}

/// The stored secret a login is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Stored {
    Hash { hash: String, salt: String },
    Plaintext(String),
    Missing,
}

impl Stored {
    fn of(account: &Account) -> Self {
        if account.has_hash() {
            Self::Hash {
                hash: account.password_hash.clone(),
                salt: account.salt.clone(),
            }
        } else if account.has_plaintext() {
            Self::Plaintext(account.password.clone())
        } else {
            Self::Missing
        }
    }
}

/// One account's credential, copied out of the store for verification.
#[derive(Debug, Clone)]
pub struct LoginCheck {
    name: String,
    stored: Stored,
    rounds: u32,
}

impl LoginCheck {
    /// Checks `password` without touching the store. A legacy plaintext
    /// match also derives the replacement hash here.
    ///
    /// # Errors
    /// [`SessionError::WrongPassword`] when verification fails or the
    /// account has neither a hash nor a legacy password.
    pub fn verify(self, password: &str) -> Result<VerifiedLogin, SessionError> {
        let upgrade = match &self.stored {
            Stored::Hash { hash, salt } => {
                if !verify_password(password, salt, hash, self.rounds) {
                    return Err(SessionError::WrongPassword(self.name));
                }
                None
            }
            Stored::Plaintext(plain) => {
                if plain != password {
                    return Err(SessionError::WrongPassword(self.name));
                }
                Some(Credential::derive(password, self.rounds))
            }
            Stored::Missing => {
                tracing::warn!(name = %self.name, "account has no credential");
                return Err(SessionError::WrongPassword(self.name));
            }
        };
        Ok(VerifiedLogin {
            name: self.name,
            checked: self.stored,
            upgrade,
        })
    }
}

/// A password that matched, waiting to be applied to the store.
#[derive(Debug, Clone)]
pub struct VerifiedLogin {
    name: String,
    checked: Stored,
    upgrade: Option<Credential>,
}

impl VerifiedLogin {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What a successful login hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub access_level: i32,
    pub appearance: String,
    /// The account was migrated from a plaintext password and should be
    /// persisted right away.
    pub upgraded: bool,
}

/// All accounts, keyed by exact (case-sensitive) name.
#[derive(Debug)]
pub struct AccountStore {
    accounts: HashMap<String, Account>,
    rounds: u32,
    /// Bumped on every change, so stale snapshots can be told apart.
    generation: u64,
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore {
    pub fn new() -> Self {
        Self::with_rounds(PBKDF2_ROUNDS)
    }

    /// A store that hashes with a custom iteration count.
    ///
    /// Stored hashes don't record their round count, so a store must
    /// always be reopened with the rounds it was written with.
    pub fn with_rounds(rounds: u32) -> Self {
        Self {
            accounts: HashMap::new(),
            rounds: rounds.max(1),
            generation: 0,
        }
    }

    /// Replaces the contents with loaded accounts.
    ///
    /// Blank names are dropped; a repeated name keeps its last record.
    pub fn load(&mut self, accounts: Vec<Account>) {
        self.generation += 1;
        self.accounts.clear();
        for account in accounts {
            if account.name.trim().is_empty() {
                tracing::warn!("skipping account with empty name");
                continue;
            }
            self.accounts.insert(account.name.clone(), account);
        }
        tracing::info!(count = self.accounts.len(), "accounts loaded");
    }

    /// Every account, sorted by name, for persistence.
    pub fn snapshot(&self) -> Vec<Account> {
        let mut all: Vec<Account> = self.accounts.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Changes with every mutation; equal generations mean equal snapshots.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// PBKDF2 iterations this store hashes and verifies with.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn contains(&self, name: &str) -> bool {
        self.accounts.contains_key(name)
    }

    /// Derives a credential and registers in one step.
    ///
    /// # Errors
    /// [`SessionError::Exists`] when the name is already registered.
    pub fn register(
        &mut self,
        name: &str,
        password: &str,
        appearance: &str,
    ) -> Result<(), SessionError> {
        if self.contains(name) {
            return Err(SessionError::Exists(name.to_string()));
        }
        let credential = Credential::derive(password, self.rounds);
        self.insert(name, credential, appearance)
    }

    /// Creates a new account from a credential derived beforehand.
    ///
    /// # Errors
    /// [`SessionError::Exists`] when the name is already registered.
    pub fn insert(
        &mut self,
        name: &str,
        credential: Credential,
        appearance: &str,
    ) -> Result<(), SessionError> {
        if self.contains(name) {
            return Err(SessionError::Exists(name.to_string()));
        }

        let account = Account {
            name: name.to_string(),
            password_hash: credential.hash,
            salt: credential.salt,
            password: String::new(),
            access_level: normalize_access_level(name, DEFAULT_ACCESS_LEVEL),
            appearance: appearance.to_string(),
        };
        self.accounts.insert(name.to_string(), account);
        self.generation += 1;
        tracing::info!(%name, "account registered");
        Ok(())
    }

    /// Verifies a password and returns the account's grant in one step.
    ///
    /// # Errors
    /// See [`AccountStore::login_check`], [`LoginCheck::verify`] and
    /// [`AccountStore::complete_login`].
    pub fn login(&mut self, name: &str, password: &str) -> Result<LoginGrant, SessionError> {
        let verified = self.login_check(name)?.verify(password)?;
        self.complete_login(verified)
    }

    /// Copies out what a login for `name` must verify.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] when no such account exists.
    pub fn login_check(&self, name: &str) -> Result<LoginCheck, SessionError> {
        let account = self
            .accounts
            .get(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))?;
        Ok(LoginCheck {
            name: name.to_string(),
            stored: Stored::of(account),
            rounds: self.rounds,
        })
    }

    /// Applies a verified login, storing the upgraded hash if there is one.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] when the account is gone
    /// - [`SessionError::WrongPassword`] when its credential changed after
    ///   the check was taken
    pub fn complete_login(&mut self, verified: VerifiedLogin) -> Result<LoginGrant, SessionError> {
        let VerifiedLogin {
            name,
            checked,
            upgrade,
        } = verified;
        let account = self
            .accounts
            .get_mut(&name)
            .ok_or_else(|| SessionError::NotFound(name.clone()))?;
        if Stored::of(account) != checked {
            tracing::warn!(%name, "credential changed during login");
            return Err(SessionError::WrongPassword(name));
        }

        let upgraded = upgrade.is_some();
        if let Some(credential) = upgrade {
            account.password_hash = credential.hash;
            account.salt = credential.salt;
            account.password.clear();
            tracing::info!(%name, "legacy password upgraded to hash");
        }
        let grant = LoginGrant {
            access_level: normalize_access_level(&name, account.access_level),
            appearance: account.appearance.clone(),
            upgraded,
        };
        if upgraded {
            self.generation += 1;
        }
        Ok(grant)
    }

    /// Normalized access level, or the default for unknown names.
    pub fn access_level(&self, name: &str) -> i32 {
        match self.accounts.get(name) {
            Some(account) => normalize_access_level(name, account.access_level),
            None => normalize_access_level(name, DEFAULT_ACCESS_LEVEL),
        }
    }

    /// Stores a new appearance. Returns `true` if it changed.
    pub fn set_appearance(&mut self, name: &str, appearance: &str) -> bool {
        match self.accounts.get_mut(name) {
            Some(account) if account.appearance != appearance => {
                account.appearance = appearance.to_string();
                self.generation += 1;
                true
            }
            _ => false,
        }
    }

    /// Normalizes every stored access level. Returns `true` if any changed.
    pub fn normalize_all(&mut self) -> bool {
        let mut changed = false;
        for (name, account) in &mut self.accounts {
            let normalized = normalize_access_level(name, account.access_level);
            if normalized != account.access_level {
                tracing::info!(
                    %name,
                    from = account.access_level,
                    to = normalized,
                    "access level normalized"
                );
                account.access_level = normalized;
                changed = true;
            }
        }
        if changed {
            self.generation += 1;
        }
        changed
    }

    pub fn get(&self, name: &str) -> Option<&Account> {
        self.accounts.get(name)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Draws a salt and hashes; returns `(hash_b64, salt_b64)`.
fn hash_new(password: &str, rounds: u32) -> (String, String) {
    let salt: [u8; SALT_LEN] = rand::rng().random();
    let hash = hash_password(password, &salt, rounds);
    (STANDARD.encode(hash), STANDARD.encode(salt))
}

fn hash_password(password: &str, salt: &[u8], rounds: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut out);
    out
}

/// Re-derives and compares in constant time. Undecodable stored values
/// never verify.
fn verify_password(password: &str, salt_b64: &str, hash_b64: &str, rounds: u32) -> bool {
    let (Ok(salt), Ok(expected)) = (STANDARD.decode(salt_b64), STANDARD.decode(hash_b64)) else {
        return false;
    };
    let actual = hash_password(password, &salt, rounds);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low round count keeps unit tests fast; the production count is
    // exercised by the server integration tests.
    fn store() -> AccountStore {
        AccountStore::with_rounds(64)
    }

    #[test]
    fn test_normalize_access_level_rules() {
        assert_eq!(normalize_access_level("admin", 5), 1);
        assert_eq!(normalize_access_level("ADMIN", 3), 1);
        assert_eq!(normalize_access_level("alice", 3), 3);
        assert_eq!(normalize_access_level("alice", 0), 5);
        assert_eq!(normalize_access_level("alice", 6), 5);
        assert_eq!(normalize_access_level("alice", -2), 5);
        assert_eq!(normalize_access_level("administrator", 2), 2);
    }

    #[test]
    fn test_register_stores_salted_hash_not_plaintext() {
        let mut s = store();
        s.register("alice", "secret", "blue").unwrap();

        let account = s.get("alice").unwrap();
        assert!(account.password.is_empty());
        assert_eq!(STANDARD.decode(&account.salt).unwrap().len(), SALT_LEN);
        assert_eq!(STANDARD.decode(&account.password_hash).unwrap().len(), HASH_LEN);
        assert_eq!(account.access_level, 5);
        assert_eq!(account.appearance, "blue");
    }

    #[test]
    fn test_register_same_password_gets_different_salts() {
        let mut s = store();
        s.register("a", "pw", "").unwrap();
        s.register("b", "pw", "").unwrap();
        assert_ne!(s.get("a").unwrap().salt, s.get("b").unwrap().salt);
        assert_ne!(s.get("a").unwrap().password_hash, s.get("b").unwrap().password_hash);
    }

    #[test]
    fn test_register_existing_name_returns_exists() {
        let mut s = store();
        s.register("alice", "secret", "").unwrap();
        let err = s.register("alice", "other", "").unwrap_err();
        assert_eq!(err, SessionError::Exists("alice".into()));
        assert_eq!(err.code(), "exists");
    }

    #[test]
    fn test_register_names_are_case_sensitive() {
        let mut s = store();
        s.register("alice", "secret", "").unwrap();
        s.register("Alice", "secret", "").unwrap();
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_register_admin_gets_level_one() {
        let mut s = store();
        s.register("admin", "root", "").unwrap();
        assert_eq!(s.get("admin").unwrap().access_level, 1);
    }

    #[test]
    fn test_login_unknown_name_returns_not_found() {
        let mut s = store();
        assert_eq!(s.login("ghost", "pw").unwrap_err().code(), "not_found");
    }

    #[test]
    fn test_login_correct_and_wrong_password() {
        let mut s = store();
        s.register("alice", "secret", "green").unwrap();

        let grant = s.login("alice", "secret").unwrap();
        assert_eq!(
            grant,
            LoginGrant {
                access_level: 5,
                appearance: "green".into(),
                upgraded: false,
            }
        );
        assert_eq!(s.login("alice", "Secret").unwrap_err().code(), "wrong_password");
    }

    #[test]
    fn test_login_legacy_plaintext_upgrades_once() {
        let mut s = store();
        s.load(vec![Account {
            name: "old".into(),
            password: "hunter2".into(),
            access_level: 2,
            ..Account::default()
        }]);

        assert_eq!(s.login("old", "wrong").unwrap_err().code(), "wrong_password");
        assert!(s.get("old").unwrap().password_hash.is_empty());

        let grant = s.login("old", "hunter2").unwrap();
        assert!(grant.upgraded);
        assert_eq!(grant.access_level, 2);

        let account = s.get("old").unwrap();
        assert!(account.password.is_empty());
        assert!(!account.password_hash.is_empty());

        let again = s.login("old", "hunter2").unwrap();
        assert!(!again.upgraded);
    }

    #[test]
    fn test_login_account_without_credential_is_rejected() {
        let mut s = store();
        s.load(vec![Account {
            name: "empty".into(),
            ..Account::default()
        }]);
        assert_eq!(s.login("empty", "").unwrap_err().code(), "wrong_password");
        assert_eq!(s.login("empty", "x").unwrap_err().code(), "wrong_password");
    }

    #[test]
    fn test_login_corrupt_stored_hash_never_verifies() {
        let mut s = store();
        s.load(vec![Account {
            name: "bad".into(),
            password_hash: "!!!".into(),
            salt: "???".into(),
            ..Account::default()
        }]);
        assert_eq!(s.login("bad", "anything").unwrap_err().code(), "wrong_password");
    }

    #[test]
    fn test_login_normalizes_out_of_range_level() {
        let mut s = store();
        s.register("bob", "pw", "").unwrap();
        s.accounts.get_mut("bob").unwrap().access_level = 42;
        assert_eq!(s.login("bob", "pw").unwrap().access_level, 5);
    }

    #[test]
    fn test_normalize_all_reports_changes() {
        let mut s = store();
        s.load(vec![
            Account {
                name: "admin".into(),
                access_level: 5,
                ..Account::default()
            },
            Account {
                name: "carol".into(),
                access_level: 3,
                ..Account::default()
            },
        ]);
        assert!(s.normalize_all());
        assert_eq!(s.get("admin").unwrap().access_level, 1);
        assert_eq!(s.get("carol").unwrap().access_level, 3);
        assert!(!s.normalize_all());
    }

    #[test]
    fn test_set_appearance_reports_change() {
        let mut s = store();
        s.register("alice", "pw", "").unwrap();
        assert!(s.set_appearance("alice", "red"));
        assert!(!s.set_appearance("alice", "red"));
        assert!(!s.set_appearance("nobody", "red"));
        assert_eq!(s.get("alice").unwrap().appearance, "red");
    }

    #[test]
    fn test_load_skips_blank_names_and_keeps_last_duplicate() {
        let mut s = store();
        s.load(vec![
            Account {
                name: " ".into(),
                ..Account::default()
            },
            Account {
                name: "dup".into(),
                appearance: "first".into(),
                ..Account::default()
            },
            Account {
                name: "dup".into(),
                appearance: "second".into(),
                ..Account::default()
            },
        ]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get("dup").unwrap().appearance, "second");
    }

    #[test]
    fn test_account_json_uses_camel_case_and_tolerates_missing_fields() {
        let account: Account = serde_json::from_str(r#"{"name":"x","password":"p"}"#).unwrap();
        assert_eq!(account.access_level, 0);
        assert!(account.password_hash.is_empty());

        let text = serde_json::to_string(&account).unwrap();
        assert!(text.contains("\"passwordHash\""));
        assert!(text.contains("\"accessLevel\""));
    }

    #[test]
    fn test_account_json_pascal_case_loads_and_upgrades() {
        let accounts: Vec<Account> = serde_json::from_str(
            r#"[{"Name":"bob","PasswordHash":"","Salt":"","Password":"hunter2","AccessLevel":3}]"#,
        )
        .unwrap();
        assert_eq!(accounts[0].name, "bob");
        assert_eq!(accounts[0].access_level, 3);

        let mut s = store();
        s.load(accounts);
        let grant = s.login("bob", "hunter2").unwrap();
        assert!(grant.upgraded);
        assert_eq!(grant.access_level, 3);

        let text = serde_json::to_string(&s.snapshot()).unwrap();
        assert!(text.contains("\"passwordHash\""));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_login_check_verifies_without_the_store() {
        let mut s = store();
        s.register("alice", "secret", "").unwrap();

        let check = s.login_check("alice").unwrap();
        // The store stays usable while the check is verified.
        s.register("bob", "pw", "").unwrap();
        let verified = check.verify("secret").unwrap();
        assert_eq!(verified.name(), "alice");
        assert!(!s.complete_login(verified).unwrap().upgraded);

        let check = s.login_check("alice").unwrap();
        assert_eq!(check.verify("nope").unwrap_err().code(), "wrong_password");
        assert_eq!(s.login_check("ghost").unwrap_err().code(), "not_found");
    }

    #[test]
    fn test_complete_login_credential_changed_is_rejected() {
        let mut s = store();
        s.load(vec![Account {
            name: "old".into(),
            password: "hunter2".into(),
            ..Account::default()
        }]);

        let first = s.login_check("old").unwrap().verify("hunter2").unwrap();
        let second = s.login_check("old").unwrap().verify("hunter2").unwrap();
        assert!(s.complete_login(first).unwrap().upgraded);
        let hash = s.get("old").unwrap().password_hash.clone();

        // The second upgrade was derived from the plaintext that is gone now.
        assert_eq!(s.complete_login(second).unwrap_err().code(), "wrong_password");
        assert_eq!(s.get("old").unwrap().password_hash, hash);
        assert!(!s.login("old", "hunter2").unwrap().upgraded);
    }

    #[test]
    fn test_insert_existing_name_returns_exists() {
        let mut s = store();
        let credential = Credential::derive("pw", s.rounds());
        s.insert("alice", credential.clone(), "").unwrap();
        assert_eq!(s.insert("alice", credential, "").unwrap_err().code(), "exists");
        assert!(s.login("alice", "pw").is_ok());
    }

    #[test]
    fn test_generation_moves_only_on_change() {
        let mut s = store();
        s.load(vec![Account {
            name: "old".into(),
            password: "hunter2".into(),
            ..Account::default()
        }]);
        let loaded = s.generation();

        s.login("old", "wrong").unwrap_err();
        s.set_appearance("ghost", "red");
        assert_eq!(s.generation(), loaded);

        s.login("old", "hunter2").unwrap();
        let upgraded = s.generation();
        assert!(upgraded > loaded);

        s.login("old", "hunter2").unwrap();
        assert_eq!(s.generation(), upgraded);

        s.register("new", "pw", "").unwrap();
        assert!(s.generation() > upgraded);
    }

    #[test]
    fn test_snapshot_sorted_by_name() {
        let mut s = store();
        for name in ["carol", "alice", "bob"] {
            s.register(name, "pw", "").unwrap();
        }
        let names: Vec<String> = s.snapshot().into_iter().map(|a| a.name).collect();
        assert_eq!(names, ["alice", "bob", "carol"]);
    }
}
