//! Resolution of cluster users from group memberships.
//!
//! Members of a configured set of groups are looked up in the host's passwd
//! database, producing a directory used to map chat identities to UIDs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Context;
use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::slurm::command;

/// A cluster user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct User {
    /// Login name
    pub username: String,
    /// Numeric UID as a string; the key used to match job owners
    pub unix_uid: String,
    /// Real name, taken from the first GECOS field
    pub real_name: String,
}

/// Queries against the host's group and passwd databases
pub trait IdentitySource: Send + Sync {
    /// Names of the members of `group`
    fn group_members(&self, group: &str) -> Result<Vec<String>>;
    /// Passwd entries of `member`
    fn passwd(&self, member: &str) -> Result<Vec<User>>;
}

/// Queries identities using `getent`
#[derive(Clone, Debug)]
pub struct Getent {
    pub exe: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    _name: String,
    _password: String,
    _gid: String,
    members: String,
}

#[derive(Debug, Deserialize)]
struct PasswdEntry {
    name: String,
    _password: String,
    uid: String,
    _gid: String,
    gecos: String,
    _home: String,
    _shell: String,
}

fn reader(output: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(b':')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(output)
}

impl Getent {
    /// Parses `getent group` output into a list of member names
    fn parse_group(output: &[u8]) -> Result<Vec<String>> {
        let mut members = Vec::new();
        for entry in reader(output).deserialize::<GroupEntry>() {
            let entry = entry.wrap_err("error while parsing group entry")?;

            members.extend(
                entry
                    .members
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string),
            );
        }

        Ok(members)
    }

    /// Parses `getent passwd` output into users
    fn parse_passwd(output: &[u8]) -> Result<Vec<User>> {
        let mut users = Vec::new();
        for entry in reader(output).deserialize::<PasswdEntry>() {
            let entry = entry.wrap_err("error while parsing passwd entry")?;
            // GECOS is "full name,room,work phone,home phone,other"
            let real_name = entry.gecos.split(',').next().unwrap_or_default();

            users.push(User {
                username: entry.name,
                unix_uid: entry.uid,
                real_name: real_name.to_string(),
            });
        }

        Ok(users)
    }
}

impl IdentitySource for Getent {
    fn group_members(&self, group: &str) -> Result<Vec<String>> {
        let output = command::run(&self.exe, &["group", group], self.timeout)?;

        Self::parse_group(&output)
    }

    fn passwd(&self, member: &str) -> Result<Vec<User>> {
        let output = command::run(&self.exe, &["passwd", member], self.timeout)?;

        Self::parse_passwd(&output)
    }
}

/// Expands group memberships into a list of users
pub struct IdentityResolver<I> {
    source: I,
    groups: Vec<String>,
}

impl<I: IdentitySource> IdentityResolver<I> {
    pub fn new(source: I, groups: Vec<String>) -> Self {
        Self { source, groups }
    }

    /// Resolves the members of all groups, sorted by username.
    ///
    /// Groups and members that cannot be resolved are logged and skipped, so
    /// the result is always usable, if possibly incomplete or empty.
    pub fn resolve(&self) -> Vec<User> {
        // Users may be members of several groups; each is only looked up once
        let mut members = BTreeSet::new();
        for group in &self.groups {
            match self.source.group_members(group) {
                Ok(names) => members.extend(names),
                Err(error) => tracing::warn!("failed to resolve group {:?}: {:#}", group, error),
            }
        }

        let mut users = Vec::new();
        for member in &members {
            match self.source.passwd(member) {
                Ok(entries) => users.extend(entries),
                Err(error) => tracing::warn!("failed to resolve user {:?}: {:#}", member, error),
            }
        }

        users.sort_by(|a, b| a.username.cmp(&b.username));
        tracing::info!(
            groups = self.groups.len(),
            members = members.len(),
            users = users.len(),
            "resolved cluster users"
        );

        users
    }
}

/// Lookups over a resolved list of users.
///
/// All lookups use exact, case-sensitive comparisons; `None` means that no
/// (unambiguous) match was found.
#[derive(Clone, Debug, Default)]
pub struct UserDirectory {
    users: Arc<Vec<User>>,
    /// Chat IDs mapped directly to usernames, bypassing name matching
    overrides: BTreeMap<String, String>,
}

impl UserDirectory {
    pub fn new(users: Arc<Vec<User>>, overrides: BTreeMap<String, String>) -> Self {
        Self { users, overrides }
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn by_username(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|user| user.username == username)
    }

    pub fn by_uid(&self, uid: &str) -> Option<&User> {
        self.users.iter().find(|user| user.unix_uid == uid)
    }

    /// Finds the user whose real name equals `name`; names shared by several
    /// users are ambiguous and not matched, and blank names never match
    pub fn by_display_name(&self, name: &str) -> Option<&User> {
        if name.trim().is_empty() {
            return None;
        }

        let mut matches = self.users.iter().filter(|user| user.real_name == name);
        let user = matches.next()?;

        if matches.next().is_some() {
            tracing::warn!("display name {:?} matches several users", name);
            return None;
        }

        Some(user)
    }

    /// Resolves a chat user, preferring configured overrides for `chat_id`
    /// over matching of their display name
    pub fn resolve(&self, chat_id: Option<&str>, display_name: Option<&str>) -> Option<&User> {
        if let Some(username) = chat_id.and_then(|id| self.overrides.get(id)) {
            match self.by_username(username) {
                Some(user) => return Some(user),
                None => tracing::warn!(
                    "override for {:?} names unknown user {:?}",
                    chat_id.unwrap_or_default(),
                    username
                ),
            }
        }

        display_name.and_then(|name| self.by_display_name(name))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use color_eyre::eyre::eyre;

    use super::*;

    fn user(username: &str, uid: &str, real_name: &str) -> User {
        User {
            username: username.into(),
            unix_uid: uid.into(),
            real_name: real_name.into(),
        }
    }

    struct FakeSource {
        groups: BTreeMap<&'static str, Vec<&'static str>>,
        users: Vec<User>,
        passwd_calls: AtomicUsize,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                groups: BTreeMap::from([
                    ("xusers", vec!["alice", "bob"]),
                    ("zusers", vec!["bob", "carol", "ghost"]),
                ]),
                users: vec![
                    user("carol", "1003", "Carol Jones"),
                    user("alice", "1001", "Alice Smith"),
                    user("bob", "1002", "Bob Smith"),
                ],
                passwd_calls: AtomicUsize::new(0),
            }
        }
    }

    impl IdentitySource for FakeSource {
        fn group_members(&self, group: &str) -> Result<Vec<String>> {
            self.groups
                .get(group)
                .map(|members| members.iter().map(|m| m.to_string()).collect())
                .ok_or_else(|| eyre!("group {:?} not found", group))
        }

        fn passwd(&self, member: &str) -> Result<Vec<User>> {
            self.passwd_calls.fetch_add(1, Ordering::SeqCst);
            let found: Vec<User> = self
                .users
                .iter()
                .filter(|u| u.username == member)
                .cloned()
                .collect();

            if found.is_empty() {
                Err(eyre!("user {:?} not found", member))
            } else {
                Ok(found)
            }
        }
    }

    #[test]
    fn test_parse_group() {
        let members = Getent::parse_group(b"xusers:x:1500:alice,bob\nzusers:*:1501:\n").unwrap();
        assert_eq!(members, ["alice", "bob"]);
    }

    #[test]
    fn test_parse_group_with_varying_field_counts() {
        let members =
            Getent::parse_group(b"xusers:x:1500:alice\nlegacy:x:1501:bob:trailing\n").unwrap();
        assert_eq!(members, ["alice", "bob"]);
    }

    #[test]
    fn test_parse_passwd() {
        let users = Getent::parse_passwd(
            b"alice:x:1001:1500:Alice Smith,Room 4,555-1234,,:/home/alice:/bin/bash\n\
              svc:x:998:998::/var/lib/svc:/sbin/nologin\n",
        )
        .unwrap();

        assert_eq!(
            users,
            [user("alice", "1001", "Alice Smith"), user("svc", "998", "")]
        );
    }

    #[test]
    fn test_parse_passwd_quotes_are_literal() {
        let users = Getent::parse_passwd(b"dq:x:1009:1500:\"Dee\" Quinn:/home/dq:/bin/sh\n").unwrap();
        assert_eq!(users[0].real_name, "\"Dee\" Quinn");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(Getent::parse_passwd(b"alice:x:1001\n").is_err());
    }

    #[test]
    fn test_resolve_deduplicates_members() {
        let resolver = IdentityResolver::new(
            FakeSource::new(),
            vec!["xusers".into(), "zusers".into(), "missing".into()],
        );

        let users = resolver.resolve();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();

        assert_eq!(names, ["alice", "bob", "carol"]);
        // alice, bob, carol and ghost; bob is a member of both groups
        assert_eq!(resolver.source.passwd_calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_display_name_is_exact() {
        let directory = UserDirectory::new(
            Arc::new(FakeSource::new().users),
            BTreeMap::new(),
        );

        assert_eq!(
            directory.by_display_name("Alice Smith").map(|u| &u.username[..]),
            Some("alice")
        );
        assert_eq!(directory.by_display_name("alice smith"), None);
        assert_eq!(directory.by_display_name("Smith"), None);
        assert_eq!(directory.by_display_name("Alice Smith "), None);
    }

    #[test]
    fn test_ambiguous_display_name() {
        let directory = UserDirectory::new(
            Arc::new(vec![
                user("jdoe", "1", "John Doe"),
                user("jdoe2", "2", "John Doe"),
            ]),
            BTreeMap::new(),
        );

        assert_eq!(directory.by_display_name("John Doe"), None);
        assert_eq!(directory.by_uid("2").map(|u| &u.username[..]), Some("jdoe2"));
    }

    #[test]
    fn test_resolve_with_overrides() {
        let directory = UserDirectory::new(
            Arc::new(FakeSource::new().users),
            BTreeMap::from([
                ("U07BESQTQM6".to_string(), "bob".to_string()),
                ("U000".to_string(), "nobody".to_string()),
            ]),
        );

        let resolved = |id, name| directory.resolve(id, name).map(|u| u.username.clone());

        assert_eq!(resolved(Some("U07BESQTQM6"), Some("Robert")), Some("bob".into()));
        assert_eq!(resolved(Some("U07BESQTQM6"), None), Some("bob".into()));
        // Overrides naming unknown users fall back to name matching
        assert_eq!(resolved(Some("U000"), Some("Carol Jones")), Some("carol".into()));
        assert_eq!(resolved(None, Some("Alice Smith")), Some("alice".into()));
        assert_eq!(resolved(Some("U999"), Some("Nobody Known")), None);
    }

    #[test]
    fn test_blank_display_name_never_matches() {
        let directory = UserDirectory::new(
            Arc::new(vec![
                user("alice", "1001", "Alice Smith"),
                user("svc", "998", ""),
            ]),
            BTreeMap::new(),
        );

        assert_eq!(directory.by_display_name(""), None);
        assert_eq!(directory.by_display_name("  "), None);
        assert_eq!(directory.resolve(Some("U_UNKNOWN"), Some("")), None);
        assert_eq!(directory.resolve(Some("U_UNKNOWN"), None), None);
    }
}
