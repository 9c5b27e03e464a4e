//! Child environment assembly for the spawn contract: base process env is
//! overridden by the package's own `.env` file, which is in turn
//! overridden by the caller-supplied `environment` map. The fixed contract
//! variables (`AGENT_APP_ID`, the port triple, ...) are applied last since
//! they describe the host's allocation and must never be shadowed.

use std::collections::HashMap;
use std::path::Path;

/// Parses a `KEY=VALUE` per line `.env` file, tolerating blank lines and
/// `#`-prefixed comments. Malformed lines are skipped rather than rejected,
/// since a broken `.env` should not block startup.
pub async fn parse_dotenv(path: &Path) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    let Ok(contents) = tokio::fs::read_to_string(path).await else {
        return vars;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let mut value = value.trim();
            if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
                || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
            {
                value = &value[1..value.len() - 1];
            }
            if !key.is_empty() {
                vars.insert(key.to_string(), value.to_string());
            }
        }
    }
    vars
}

/// Fixed contract variables injected on top of the merged environment.
pub struct ContractVars {
    pub agent_package_path: String,
    pub agent_app_id: String,
    pub rest_port: Option<u16>,
    pub rpc_port: Option<u16>,
    pub ui_port: Option<u16>,
    pub multiplexed: bool,
    /// `None` leaves `BASE_PATH` unset so the child applies its own
    /// `/agents/{AGENT_APP_ID}` default rather than the host pre-deciding
    /// it.
    pub base_path: Option<String>,
}

impl ContractVars {
    fn apply(&self, vars: &mut HashMap<String, String>) {
        vars.insert("AGENT_PACKAGE_PATH".to_string(), self.agent_package_path.clone());
        vars.insert("AGENT_APP_ID".to_string(), self.agent_app_id.clone());
        if let Some(p) = self.rest_port {
            vars.insert("REST_PORT".to_string(), p.to_string());
        }
        if let Some(p) = self.rpc_port {
            vars.insert("RPC_PORT".to_string(), p.to_string());
        }
        if let Some(p) = self.ui_port {
            vars.insert("UI_PORT".to_string(), p.to_string());
        }
        vars.insert("MULTIPLEXED".to_string(), self.multiplexed.to_string());
        if let Some(base_path) = &self.base_path {
            vars.insert("BASE_PATH".to_string(), base_path.clone());
        }
    }
}

/// Builds the full child environment: base process env ← package `.env` ←
/// caller-supplied, then the fixed contract variables on top.
pub async fn build_child_env(
    package_root: &Path,
    caller_supplied: &HashMap<String, String>,
    contract: &ContractVars,
) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = std::env::vars().collect();

    let dotenv_path = package_root.join(".env");
    for (k, v) in parse_dotenv(&dotenv_path).await {
        vars.insert(k, v);
    }

    for (k, v) in caller_supplied {
        vars.insert(k.clone(), v.clone());
    }

    contract.apply(&mut vars);
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn caller_supplied_wins_over_dotenv_and_base_env() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(".env"), "FOO=from_dotenv\nBAR=unset_by_caller\n")
            .await
            .unwrap();

        let mut caller = HashMap::new();
        caller.insert("FOO".to_string(), "from_caller".to_string());

        let contract = ContractVars {
            agent_package_path: "/pkg".to_string(),
            agent_app_id: "app-1".to_string(),
            rest_port: Some(8080),
            rpc_port: Some(50051),
            ui_port: Some(3000),
            multiplexed: true,
            base_path: Some("/".to_string()),
        };

        let merged = build_child_env(dir.path(), &caller, &contract).await;
        assert_eq!(merged.get("FOO"), Some(&"from_caller".to_string()));
        assert_eq!(merged.get("BAR"), Some(&"unset_by_caller".to_string()));
        assert_eq!(merged.get("AGENT_APP_ID"), Some(&"app-1".to_string()));
        assert_eq!(merged.get("REST_PORT"), Some(&"8080".to_string()));
    }

    #[tokio::test]
    async fn contract_vars_cannot_be_shadowed_by_caller() {
        let dir = tempfile::tempdir().unwrap();
        let mut caller = HashMap::new();
        caller.insert("AGENT_APP_ID".to_string(), "spoofed".to_string());

        let contract = ContractVars {
            agent_package_path: "/pkg".to_string(),
            agent_app_id: "real-app".to_string(),
            rest_port: None,
            rpc_port: None,
            ui_port: None,
            multiplexed: false,
            base_path: Some("/".to_string()),
        };

        let merged = build_child_env(dir.path(), &caller, &contract).await;
        assert_eq!(merged.get("AGENT_APP_ID"), Some(&"real-app".to_string()));
    }

    #[test]
    fn parses_quoted_and_commented_dotenv_lines() {
        let contents = "# a comment\nFOO=\"bar\"\n\nBAZ=qux\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, contents).unwrap();
        let vars = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(parse_dotenv(&path));
        assert_eq!(vars.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(vars.get("BAZ"), Some(&"qux".to_string()));
        assert_eq!(vars.get("a"), None);
    }
}
