// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// DDL/DCL 语句构造. 这些语句不能使用绑定参数, 标识符和字面量必须转义.

/// Quote a PostgreSQL identifier: `new_user` → `"new_user"`.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a PostgreSQL string literal.
///
/// Backslashes switch to the `E'...'` form, as libpq's `PQescapeLiteral` does,
/// so the result is correct whatever `standard_conforming_strings` is set to.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!(" E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{escaped}'")
    }
}

pub fn create_user(user: &str, password: &str) -> String {
    format!(
        "CREATE USER {} PASSWORD {}",
        quote_ident(user),
        quote_literal(password)
    )
}

pub fn alter_user_password(user: &str, password: &str) -> String {
    format!(
        "ALTER USER {} WITH PASSWORD {}",
        quote_ident(user),
        quote_literal(password)
    )
}

pub fn create_database(name: &str) -> String {
    format!("CREATE DATABASE {}", quote_ident(name))
}

pub fn grant_database(name: &str, user: &str) -> String {
    format!(
        "GRANT ALL PRIVILEGES ON DATABASE {} TO {}",
        quote_ident(name),
        quote_ident(user)
    )
}

pub fn grant_public_schema(user: &str) -> String {
    format!("GRANT ALL ON SCHEMA public TO {}", quote_ident(user))
}
