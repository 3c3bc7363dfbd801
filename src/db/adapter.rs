//! Dialect adaptation of commands.
//!
//! `CommandAdapter::adapt` turns a caller's command into the text and
//! argument list one driver family expects. Commands are written with
//! `@name` markers; the adapter rewrites them into `?`, `$n` or `:name` and
//! applies the few engine specific token fixups.
//!
//! Adaptation never touches the source command, so running the same command
//! twice adapts it twice from the original text.

use crate::db::driver::{AdaptedCommand, BoundArg};
use crate::db::provider::supports_guid;
use crate::error::{DbError, DbResult};
use crate::models::{
    Command, CommandKind, DbType, DbValue, DriverFamily, EngineKind, Parameter,
    ParameterDirection,
};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("valid parameter marker regex"));

/// Portable type tokens and their per-engine expansions: (token, oracle, other).
const SQL_TOKENS: &[(&str, &str, &str)] = &[
    ("{DataType.String}", "varchar2", "nvarchar"),
    ("{DataType.DateTime}", "Date", "Datetime2"),
    ("{DataType.Integer}", "NUMBER", "BigInt"),
    ("{DataType.Bool}", "NUMBER(1,0)", "BIT"),
    ("{Date.Day(}", "TRUNC(", "CONVERT(DATE,"),
];

/// Rewrites commands for one engine and driver family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAdapter {
    engine: EngineKind,
    family: DriverFamily,
}

impl CommandAdapter {
    pub fn new(engine: EngineKind, family: DriverFamily) -> Self {
        Self { engine, family }
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    pub fn family(&self) -> DriverFamily {
        self.family
    }

    /// Produce the driver-ready form of a command.
    ///
    /// Every declared parameter except return values is bound, in declaration
    /// order. Positional text must carry exactly one `?` per bound parameter.
    pub fn adapt(&self, command: &Command) -> DbResult<AdaptedCommand> {
        let declared = declared_inputs(command);
        let mut text = match self.family {
            DriverFamily::Positional => {
                let (text, order) = rewrite_markers(&command.text, &declared, |_| "?".to_string());
                if command.kind == CommandKind::Text {
                    check_positional(&text, &order, declared.len())?;
                }
                text
            }
            DriverFamily::Numbered => {
                rewrite_markers(&command.text, &declared, |index| format!("${}", index + 1)).0
            }
            DriverFamily::ColonNamed => command.text.replace('@', ":"),
            DriverFamily::Named => command.text.clone(),
        };

        if self.engine.is_oracle() {
            text = text.replace("ISNULL(", "NVL(");
        }

        let guid_native = supports_guid(self.engine);
        let args = declared
            .into_iter()
            .map(|parameter| bound_arg(parameter, guid_native))
            .collect();

        Ok(AdaptedCommand {
            text,
            kind: command.kind,
            args,
            timeout: command.effective_timeout(),
        })
    }
}

/// Replace `@name` markers of declared parameters with the placeholder for
/// the parameter's declaration index. Also returns the index of every marker
/// replaced, in text order.
fn rewrite_markers(
    text: &str,
    declared: &[&Parameter],
    placeholder: impl Fn(usize) -> String,
) -> (String, Vec<usize>) {
    let mut order = Vec::new();
    let rewritten = MARKER_RE.replace_all(text, |caps: &Captures<'_>| {
        let start = caps.get(0).map_or(0, |m| m.start());
        // `@@name` is a server variable, not a parameter
        if text[..start].ends_with('@') {
            return caps[0].to_string();
        }
        match declared
            .iter()
            .position(|p| p.bare_name().eq_ignore_ascii_case(&caps[1]))
        {
            Some(index) => {
                order.push(index);
                placeholder(index)
            }
            None => caps[0].to_string(),
        }
    });
    (rewritten.into_owned(), order)
}

/// Positional drivers bind by position only, so markers must follow
/// declaration order and every declared parameter needs exactly one `?`.
fn check_positional(text: &str, order: &[usize], declared: usize) -> DbResult<()> {
    if order.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(DbError::invalid_input(
            "Parameter markers must appear once each, in the order the parameters are declared",
        ));
    }
    let found = count_placeholders(text);
    if found != declared {
        return Err(DbError::invalid_input(format!(
            "Command text has {} positional placeholders but {} parameters are declared",
            found, declared
        )));
    }
    Ok(())
}

/// `?` placeholders outside quoted literals and identifiers.
fn count_placeholders(text: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut count = 0;
    for c in text.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '?') => count += 1,
            _ => {}
        }
    }
    count
}

/// Parameters in declaration order, without return values.
fn declared_inputs(command: &Command) -> Vec<&Parameter> {
    command
        .parameters
        .iter()
        .filter(|p| p.direction != ParameterDirection::ReturnValue)
        .collect()
}

fn bound_arg(parameter: &Parameter, guid_native: bool) -> BoundArg {
    let (value, db_type) = match (&parameter.value, guid_native) {
        (DbValue::Guid(g), false) => (DbValue::Bytes(g.as_bytes().to_vec()), DbType::Binary),
        (DbValue::Null, false) if parameter.db_type == DbType::Guid => {
            (DbValue::Null, DbType::Binary)
        }
        (value, _) => (value.clone(), parameter.db_type),
    };
    BoundArg {
        name: parameter.bare_name().to_string(),
        value,
        db_type,
        direction: parameter.direction,
    }
}

/// Expand portable type tokens such as `{DataType.String}` for an engine.
pub fn replace_sql_tokens(sql: &str, engine: EngineKind) -> String {
    SQL_TOKENS
        .iter()
        .fold(sql.to_string(), |acc, (token, oracle, other)| {
            let replacement = if engine.is_oracle() { oracle } else { other };
            acc.replace(token, replacement)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn positional(engine: EngineKind) -> CommandAdapter {
        CommandAdapter::new(engine, DriverFamily::Positional)
    }

    #[test]
    fn test_positional_replaces_markers_in_order() {
        let command = Command::new("SELECT * FROM t WHERE a = @a AND b = @b")
            .param("a", 1)
            .param("b", "x");
        let adapted = positional(EngineKind::Other).adapt(&command).unwrap();

        assert_eq!(adapted.text, "SELECT * FROM t WHERE a = ? AND b = ?");
        let names: Vec<&str> = adapted.args.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(!adapted.text.contains('@'));
    }

    #[test]
    fn test_positional_rejects_markers_out_of_declaration_order() {
        let command = Command::new("UPDATE t SET b = @b WHERE a = @a")
            .param("a", 1)
            .param("b", 2);
        let result = positional(EngineKind::Other).adapt(&command);

        assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    }

    #[test]
    fn test_positional_rejects_repeated_markers() {
        let command = Command::new("SELECT @x + @x").param("x", 4);
        let result = positional(EngineKind::Other).adapt(&command);

        assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    }

    #[test]
    fn test_positional_native_placeholders_bind_declared_parameters() {
        let command = Command::new("SELECT * FROM t WHERE a = ? AND b = ?")
            .param("a", 1)
            .param("b", 2);
        let adapted = positional(EngineKind::Other).adapt(&command).unwrap();

        assert_eq!(adapted.text, "SELECT * FROM t WHERE a = ? AND b = ?");
        let values: Vec<&DbValue> = adapted.args.iter().map(|a| &a.value).collect();
        assert_eq!(values, vec![&DbValue::Int32(1), &DbValue::Int32(2)]);
    }

    #[test]
    fn test_positional_placeholder_count_mismatch() {
        let command = Command::new("SELECT ? + 1").param("a", 1).param("b", 2);
        let result = positional(EngineKind::Other).adapt(&command);
        assert!(matches!(result, Err(DbError::InvalidInput { .. })));

        let command = Command::new("SELECT * FROM t WHERE a = ?");
        let result = positional(EngineKind::Other).adapt(&command);
        assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    }

    #[test]
    fn test_placeholders_in_literals_are_not_counted() {
        let command = Command::new("SELECT 'why?', \"a?\" FROM t WHERE a = @a").param("a", 1);
        let adapted = positional(EngineKind::Other).adapt(&command).unwrap();

        assert_eq!(adapted.text, "SELECT 'why?', \"a?\" FROM t WHERE a = ?");
        assert_eq!(adapted.args.len(), 1);
    }

    #[test]
    fn test_stored_procedure_skips_placeholder_check() {
        let command = Command::stored_procedure("refresh").param("a", 1);
        let adapted = positional(EngineKind::Other).adapt(&command).unwrap();
        assert_eq!(adapted.args.len(), 1);
    }

    #[test]
    fn test_positional_placeholder_count_matches_parameters() {
        let command = Command::new("INSERT INTO t (a, b, c) VALUES (@a, @b, @c)")
            .param("@a", 1)
            .param("@b", 2)
            .param("@c", 3);
        let adapted = positional(EngineKind::Other).adapt(&command).unwrap();

        assert_eq!(adapted.text.matches('?').count(), command.parameters.len());
        assert!(!MARKER_RE.is_match(&adapted.text));
    }

    #[test]
    fn test_positional_leaves_unknown_and_system_markers() {
        let command = Command::new("SELECT @@ROWCOUNT, @other, @id").param("id", 1);
        let adapted = positional(EngineKind::Other).adapt(&command).unwrap();

        assert_eq!(adapted.text, "SELECT @@ROWCOUNT, @other, ?");
        assert_eq!(adapted.args.len(), 1);
    }

    #[test]
    fn test_positional_word_boundary() {
        let command = Command::new("SELECT @id, @idx")
            .param("id", 1)
            .param("idx", 2);
        let adapted = positional(EngineKind::Other).adapt(&command).unwrap();

        assert_eq!(adapted.text, "SELECT ?, ?");
        assert_eq!(adapted.args[1].name, "idx");
    }

    #[test]
    fn test_numbered_family_numbers_by_declaration() {
        let command = Command::new("UPDATE t SET b = @b WHERE a = @a")
            .param("a", 1)
            .param("b", 2);
        let adapted = CommandAdapter::new(EngineKind::Other, DriverFamily::Numbered)
            .adapt(&command)
            .unwrap();

        assert_eq!(adapted.text, "UPDATE t SET b = $2 WHERE a = $1");
        let names: Vec<&str> = adapted.args.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_numbered_family() {
        let command = Command::new("SELECT * FROM t WHERE a = @a OR b = @b OR a2 = @a")
            .param("a", 1)
            .param("b", 2);
        let adapted = CommandAdapter::new(EngineKind::Other, DriverFamily::Numbered)
            .adapt(&command)
            .unwrap();

        assert_eq!(adapted.text, "SELECT * FROM t WHERE a = $1 OR b = $2 OR a2 = $1");
        assert_eq!(adapted.args.len(), 2);
    }

    #[test]
    fn test_colon_named_family() {
        let command = Command::new("SELECT * FROM t WHERE a = @a").param("a", 1);
        let adapted = CommandAdapter::new(EngineKind::OracleLike, DriverFamily::ColonNamed)
            .adapt(&command)
            .unwrap();

        assert_eq!(adapted.text, "SELECT * FROM t WHERE a = :a");
        assert_eq!(adapted.args.len(), 1);
    }

    #[test]
    fn test_sql_server_named_family_is_untouched() {
        let command =
            Command::new("SELECT ISNULL(col, 0) FROM t WHERE x = @x").param("x", 1);
        let adapted = CommandAdapter::new(EngineKind::SqlServerLike, DriverFamily::Named)
            .adapt(&command)
            .unwrap();

        assert_eq!(adapted.text, command.text);
        assert_eq!(adapted.args.len(), 1);
    }

    #[test]
    fn test_oracle_positional_rewrites_isnull() {
        let command =
            Command::new("SELECT ISNULL(col,0) FROM t WHERE x=@x").param("x", 5);
        let adapted = positional(EngineKind::OracleLike).adapt(&command).unwrap();

        assert_eq!(adapted.text, "SELECT NVL(col,0) FROM t WHERE x=?");
        assert_eq!(adapted.args[0].value, DbValue::Int32(5));
    }

    #[test]
    fn test_isnull_rewrite_is_case_sensitive() {
        let command = Command::new("SELECT isnull(col,0) FROM t");
        let adapted = positional(EngineKind::OracleLike).adapt(&command).unwrap();
        assert_eq!(adapted.text, "SELECT isnull(col,0) FROM t");
    }

    #[test]
    fn test_adapt_does_not_mutate_command() {
        let command = Command::new("SELECT @a").param("a", 1);
        let adapter = positional(EngineKind::Other);
        let first = adapter.adapt(&command).unwrap();
        let second = adapter.adapt(&command).unwrap();

        assert_eq!(command.text, "SELECT @a");
        assert_eq!(first, second);
    }

    #[test]
    fn test_guid_becomes_bytes_without_native_support() {
        let id = Uuid::new_v4();
        let mut command = Command::new("SELECT * FROM t WHERE id = @id");
        command.add_guid_parameter("id", Some(id));

        let adapted = CommandAdapter::new(EngineKind::OracleLike, DriverFamily::ColonNamed)
            .adapt(&command)
            .unwrap();
        assert_eq!(adapted.args[0].value, DbValue::Bytes(id.as_bytes().to_vec()));
        assert_eq!(adapted.args[0].db_type, DbType::Binary);

        let adapted = positional(EngineKind::Other).adapt(&command).unwrap();
        assert_eq!(adapted.args[0].value, DbValue::Guid(id));
    }

    #[test]
    fn test_return_value_parameters_are_not_bound() {
        let mut command = Command::stored_procedure("do_work");
        command.add_parameter("a", 1);
        command.add_parameter_with_direction("ret", DbValue::Null, ParameterDirection::ReturnValue);

        let adapted = CommandAdapter::new(EngineKind::Other, DriverFamily::Named)
            .adapt(&command)
            .unwrap();
        assert_eq!(adapted.args.len(), 1);
    }

    #[test]
    fn test_timeout_carried() {
        let command = Command::new("SELECT 1").with_timeout(std::time::Duration::ZERO);
        let adapted = positional(EngineKind::Other).adapt(&command).unwrap();
        assert_eq!(adapted.timeout, None);
    }

    #[test]
    fn test_replace_sql_tokens() {
        let sql = "CREATE TABLE t (a {DataType.String}(50), b {DataType.Bool})";
        assert_eq!(
            replace_sql_tokens(sql, EngineKind::OracleLike),
            "CREATE TABLE t (a varchar2(50), b NUMBER(1,0))"
        );
        assert_eq!(
            replace_sql_tokens(sql, EngineKind::SqlServerLike),
            "CREATE TABLE t (a nvarchar(50), b BIT)"
        );
        assert_eq!(
            replace_sql_tokens("SELECT {Date.Day(}created) FROM t", EngineKind::Other),
            "SELECT CONVERT(DATE,created) FROM t"
        );
    }
}
