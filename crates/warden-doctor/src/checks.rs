//! Tool presence, version and login checks.

use semver::Version;
use serde_json::Value;
use warden_exec::{CommandRunner, CommandSpec};

/// Minimum supported git release
pub const MIN_GIT_VERSION: Version = Version::new(2, 35, 2);

/// Extract a semantic version from `git --version` output.
///
/// Vendor suffixes are dropped: `git version 2.36.0.windows.1` -> 2.36.0,
/// `git version 2.39` -> 2.39.0.
pub fn parse_git_version(output: &str) -> Option<Version> {
    let token = output.split_whitespace().last()?;
    let re = regex_lite::Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?").ok()?;
    let caps = re.captures(token)?;
    let part = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    Some(Version::new(part(1), part(2), part(3)))
}

/// Verify git and git-lfs are installed, recent and configured.
pub fn git<R: CommandRunner + ?Sized>(runner: &R) -> Vec<String> {
    let mut issues = Vec::new();

    let has_git = runner.locate("git").is_some();
    if !has_git {
        issues.push("Git executable has not been found, please install git and git-lfs.".to_string());
    } else {
        match runner.run_checked(&CommandSpec::new("git").arg("--version")) {
            Ok(out) => match parse_git_version(&out.stdout) {
                Some(v) if v < MIN_GIT_VERSION => issues.push(format!(
                    "Minimum git version required is {}, please update.",
                    MIN_GIT_VERSION
                )),
                Some(_) => {}
                None => issues.push(format!(
                    "Could not determine the git version from '{}'.",
                    out.stdout.trim()
                )),
            },
            Err(e) => issues.push(format!("Failed to query the git version: {}", e)),
        }
    }

    if runner.locate("git-lfs").is_none() {
        issues.push("Please install git-lfs from https://git-lfs.github.com/.".to_string());
    } else if has_git {
        let cmd = CommandSpec::new("git").args(["config", "--global", "--list"]);
        let configured = runner
            .run(&cmd)
            .map(|out| out.stdout.contains("filter.lfs"))
            .unwrap_or(false);
        if !configured {
            issues.push("git-lfs is installed but not configured. Run `git lfs install`.".to_string());
        }
    }

    issues
}

/// Verify `remote` is configured in the Conan at `program` and that the
/// user is logged in.
pub fn conan_login<R: CommandRunner + ?Sized>(runner: &R, program: &str, remote: &str) -> Vec<String> {
    if runner.locate(program).is_none() {
        return vec!["Conan executable has not been found, please install Conan 2.".to_string()];
    }

    let remotes = match query_json(runner, program, &["remote", "list", "--format=json"]) {
        Ok(v) => v,
        Err(issue) => return vec![issue],
    };
    let known = remotes
        .as_array()
        .map(|list| list.iter().any(|r| r["name"] == remote))
        .unwrap_or(false);
    if !known {
        return vec![format!(
            "You don't have '{}' in your list of Conan remotes. Run `conan remote add {} <url>`.",
            remote, remote
        )];
    }

    let users = match query_json(runner, program, &["remote", "list-users", "--format=json"]) {
        Ok(v) => v,
        Err(issue) => return vec![issue],
    };
    if user_name(&users, remote).is_none() {
        return vec![format!(
            "You are not logged into '{}'. Run `conan remote login {}`.",
            remote, remote
        )];
    }

    Vec::new()
}

fn query_json<R: CommandRunner + ?Sized>(runner: &R, program: &str, args: &[&str]) -> Result<Value, String> {
    let cmd = CommandSpec::new(program).args(args.iter().copied());
    let out = runner
        .run_checked(&cmd)
        .map_err(|e| format!("Failed to query Conan remotes: {}", e))?;
    serde_json::from_str(&out.stdout)
        .map_err(|e| format!("Unexpected output from `{}`: {}", cmd, e))
}

/// Find the logged-in user for `remote`.
///
/// Accepts both the list form (`[{"name": .., "user_name": ..}]`) and the
/// keyed form (`{"<remote>": {"user_name": ..}}`).
fn user_name<'a>(users: &'a Value, remote: &str) -> Option<&'a str> {
    let entry = match users {
        Value::Array(list) => list
            .iter()
            .find(|u| u["name"] == remote || u["remote"] == remote)?,
        Value::Object(map) => map.get(remote)?,
        _ => return None,
    };
    entry["user_name"].as_str().filter(|name| !name.is_empty())
}
