//! The handful of administrative statements this server answers itself
//! instead of delegating to the embedded `Session`: client
//! introspection (`USER()`, `DATABASE()`, `@@variables`), `SHOW
//! VARIABLES`, `SET` and `USE`.

use std::collections::HashMap;

use regex::Regex;

use crate::declar::charset::CharacterSet;
use crate::declar::column_type::ColumnType;
use crate::packet::resultset::{ColumnDescriptor, ResultSet, Value};

/// Per-connection admin state: session system variables, user-defined
/// `@variables`, and the currently selected database.
pub struct SessionVars {
    pub username: String,
    pub variables: HashMap<String, String>,
    pub user_vars: HashMap<String, String>,
    pub current_database: Option<String>,
}

impl SessionVars {
    pub fn new(username: &str, server_version: &str) -> Self {
        let mut variables = HashMap::new();
        variables.insert("version".into(), server_version.to_string());
        variables.insert("version_comment".into(), "mysql-server-rs".into());
        variables.insert("autocommit".into(), "1".into());
        variables.insert("character_set_client".into(), "utf8mb4".into());
        variables.insert("character_set_connection".into(), "utf8mb4".into());
        variables.insert("character_set_results".into(), "utf8mb4".into());
        variables.insert("collation_connection".into(), "utf8mb4_general_ci".into());
        variables.insert("sql_mode".into(), String::new());
        variables.insert(
            "transaction_isolation".into(),
            "REPEATABLE-READ".into(),
        );

        SessionVars {
            username: username.to_string(),
            variables,
            user_vars: HashMap::new(),
            current_database: None,
        }
    }

    fn get_system_var(&self, name: &str) -> Option<&str> {
        self.variables.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }
}

fn single_row_result(column_name: &str, value: Option<String>) -> ResultSet {
    ResultSet {
        columns: vec![ColumnDescriptor {
            name: column_name.to_string(),
            column_type: ColumnType::VarString,
            charset: CharacterSet::default(),
        }],
        rows: vec![vec![match value {
            Some(v) => Value::Str(v),
            None => Value::Null,
        }]],
    }
}

/// The outcome of an admin statement this server answered itself.
pub enum AdminOutcome {
    Rows(ResultSet),
    Ok,
}

/// Answers `sql` locally when it matches one of the recognized admin
/// forms, mutating `vars` for `SET`/`USE`. Returns `None` for anything
/// this server doesn't handle itself, so the caller can delegate to the
/// embedded `Session`.
pub fn try_handle(sql: &str, vars: &mut SessionVars) -> Option<AdminOutcome> {
    let trimmed = sql.trim().trim_end_matches(';').trim();

    if let Some(result) = try_select_function(trimmed, vars) {
        return Some(AdminOutcome::Rows(result));
    }
    if let Some(result) = try_select_system_var(trimmed, vars) {
        return Some(AdminOutcome::Rows(result));
    }
    if let Some(result) = try_show_variables(trimmed, vars) {
        return Some(AdminOutcome::Rows(result));
    }
    if try_set(trimmed, vars) {
        return Some(AdminOutcome::Ok);
    }
    if try_use(trimmed, vars) {
        return Some(AdminOutcome::Ok);
    }

    None
}

fn try_select_function(sql: &str, vars: &SessionVars) -> Option<ResultSet> {
    let upper = sql.to_ascii_uppercase();
    if upper == "SELECT USER()" || upper == "SELECT CURRENT_USER()" {
        return Some(single_row_result("USER()", Some(format!("{}@%", vars.username))));
    }
    if upper == "SELECT DATABASE()" {
        return Some(single_row_result("DATABASE()", vars.current_database.clone()));
    }
    None
}

fn try_select_system_var(sql: &str, vars: &SessionVars) -> Option<ResultSet> {
    let re = Regex::new(r"(?i)^SELECT\s+@@(?:(?:session|global)\.)?([A-Za-z_][A-Za-z0-9_]*)$")
        .unwrap();
    let caps = re.captures(sql)?;
    let name = &caps[1];
    let value = vars.get_system_var(name).map(|s| s.to_string());
    Some(single_row_result(&format!("@@{name}"), value))
}

fn try_show_variables(sql: &str, vars: &SessionVars) -> Option<ResultSet> {
    let re = Regex::new(r"(?i)^SHOW\s+VARIABLES(?:\s+LIKE\s+'([^']*)')?$").unwrap();
    let caps = re.captures(sql)?;
    let pattern = caps.get(1).map(|m| m.as_str());

    let like_to_regex = |p: &str| -> Regex {
        let escaped = regex::escape(p).replace("%", ".*").replace('_', ".");
        Regex::new(&format!("(?i)^{escaped}$")).unwrap()
    };
    let filter = pattern.map(like_to_regex);

    let mut names: Vec<&String> = vars.variables.keys().collect();
    names.sort();

    let rows = names
        .into_iter()
        .filter(|name| filter.as_ref().map(|f| f.is_match(name)).unwrap_or(true))
        .map(|name| {
            vec![
                Value::Str(name.clone()),
                Value::Str(vars.variables[name].clone()),
            ]
        })
        .collect();

    Some(ResultSet {
        columns: vec![
            ColumnDescriptor {
                name: "Variable_name".into(),
                column_type: ColumnType::VarString,
                charset: CharacterSet::default(),
            },
            ColumnDescriptor {
                name: "Value".into(),
                column_type: ColumnType::VarString,
                charset: CharacterSet::default(),
            },
        ],
        rows,
    })
}

fn try_set(sql: &str, vars: &mut SessionVars) -> bool {
    let re = Regex::new(r"(?i)^SET\s+(.+)$").unwrap();
    let Some(caps) = re.captures(sql) else {
        return false;
    };
    let assignments = &caps[1];

    for assignment in split_top_level_commas(assignments) {
        let assignment = assignment.trim();
        let without_scope = assignment
            .trim_start_matches(|c: char| c.is_whitespace())
            .to_string();
        let without_scope = strip_scope_prefix(&without_scope);

        let Some((name, value)) = without_scope.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim().trim_matches('\'').trim_matches('"').to_string();

        if let Some(user_var) = name.strip_prefix('@') {
            vars.user_vars.insert(user_var.to_string(), value);
        } else {
            vars.variables.insert(name.to_ascii_lowercase(), value);
        }
    }
    true
}

fn strip_scope_prefix(assignment: &str) -> String {
    let lower = assignment.to_ascii_lowercase();
    for prefix in ["session ", "global ", "@@session.", "@@global."] {
        if lower.starts_with(prefix) {
            return assignment[prefix.len()..].to_string();
        }
    }
    assignment.to_string()
}

fn split_top_level_commas(s: &str) -> Vec<String> {
    s.split(',').map(|piece| piece.trim().to_string()).collect()
}

/// Replaces `@@var` / `@var` references in `sql` with their current values,
/// the same textual substitution a query this server doesn't answer itself
/// gets before it's handed to the embedded `Session`. Unknown variables
/// substitute to `NULL` rather than failing the query outright.
pub fn substitute_variables(sql: &str, vars: &SessionVars) -> String {
    let re = Regex::new(
        r"(?i)@@(?:(?:session|global)\.)?([A-Za-z_][A-Za-z0-9_]*)|@([A-Za-z_][A-Za-z0-9_]*)",
    )
    .unwrap();

    re.replace_all(sql, |caps: &regex::Captures| {
        if let Some(m) = caps.get(1) {
            match vars.get_system_var(m.as_str()) {
                Some(value) => format!("'{value}'"),
                None => "NULL".to_string(),
            }
        } else if let Some(m) = caps.get(2) {
            match vars.user_vars.get(m.as_str()) {
                Some(value) => format!("'{value}'"),
                None => "NULL".to_string(),
            }
        } else {
            caps[0].to_string()
        }
    })
    .into_owned()
}

fn try_use(sql: &str, vars: &mut SessionVars) -> bool {
    let re = Regex::new(r"(?i)^USE\s+`?([A-Za-z0-9_$]+)`?$").unwrap();
    let Some(caps) = re.captures(sql) else {
        return false;
    };
    vars.current_database = Some(caps[1].to_string());
    true
}

#[cfg(test)]
mod test {
    use super::*;

    fn vars() -> SessionVars {
        SessionVars::new("root", "8.0.34-mysql-server-rs")
    }

    fn rows(outcome: AdminOutcome) -> ResultSet {
        match outcome {
            AdminOutcome::Rows(r) => r,
            AdminOutcome::Ok => panic!("expected a row result"),
        }
    }

    #[test]
    fn select_user_reports_username_and_wildcard_host() {
        let mut v = vars();
        let result = rows(try_handle("SELECT USER()", &mut v).unwrap());
        assert_eq!(result.rows[0][0], Value::Str("root@%".into()));
    }

    #[test]
    fn select_system_var_reads_default_table() {
        let mut v = vars();
        let result = rows(try_handle("SELECT @@autocommit", &mut v).unwrap());
        assert_eq!(result.rows[0][0], Value::Str("1".into()));
    }

    #[test]
    fn show_variables_like_filters_by_pattern() {
        let mut v = vars();
        let result = rows(try_handle("SHOW VARIABLES LIKE 'character_set%'", &mut v).unwrap());
        assert_eq!(result.rows.len(), 3);
    }

    #[test]
    fn set_updates_a_system_variable() {
        let mut v = vars();
        assert!(try_handle("SET autocommit = 0", &mut v).is_some());
        assert_eq!(v.variables["autocommit"], "0");
    }

    #[test]
    fn set_session_scope_prefix_is_accepted() {
        let mut v = vars();
        assert!(try_handle("SET SESSION sql_mode = 'STRICT_ALL_TABLES'", &mut v).is_some());
        assert_eq!(v.variables["sql_mode"], "STRICT_ALL_TABLES");
    }

    #[test]
    fn use_switches_the_current_database() {
        let mut v = vars();
        assert!(try_handle("USE reporting", &mut v).is_some());
        assert_eq!(v.current_database.as_deref(), Some("reporting"));
    }

    #[test]
    fn unrecognized_sql_is_not_handled() {
        let mut v = vars();
        assert!(try_handle("SELECT * FROM accounts", &mut v).is_none());
    }

    #[test]
    fn substitute_variables_replaces_system_and_user_vars() {
        let mut v = vars();
        v.user_vars.insert("id".to_string(), "7".to_string());
        let sql = substitute_variables("SELECT * FROM t WHERE x = @@autocommit AND y = @id", &v);
        assert_eq!(sql, "SELECT * FROM t WHERE x = '1' AND y = '7'");
    }

    #[test]
    fn substitute_variables_uses_null_for_unknown_names() {
        let v = vars();
        let sql = substitute_variables("SELECT @nope", &v);
        assert_eq!(sql, "SELECT NULL");
    }
}
