//! Single-administrator login.
//!
//! The login flag and the admin identity live in the settings table under two
//! keys, and logout removes both.

use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{get_required_str, load_setting, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub const SESSION_FLAG_KEY: &str = "session.isAdminLoggedIn";
pub const SESSION_USER_KEY: &str = "session.adminUser";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub username: String,
    pub full_name: String,
}

fn sha256_hex(s: &str) -> String {
    Sha256::digest(s.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// The logged-in admin, if both session keys are present and the flag is set.
pub fn current_admin(conn: &Connection) -> Result<Option<AdminUser>, HandlerErr> {
    let flag = load_setting(conn, SESSION_FLAG_KEY)?;
    if flag.and_then(|v| v.as_bool()) != Some(true) {
        return Ok(None);
    }
    let Some(user) = load_setting(conn, SESSION_USER_KEY)? else {
        return Ok(None);
    };
    Ok(serde_json::from_value(user).ok())
}

fn auth_login(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let username = get_required_str(params, "username")?;
    // Passwords are compared as given; only surrounding whitespace of the username is trimmed.
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing password"))?;

    let cfg = setup::auth_config(conn)?;
    if username != cfg.username || sha256_hex(password) != cfg.password_sha256 {
        tracing::warn!(username = %username, "login rejected");
        return Err(HandlerErr::new(
            "bad_credentials",
            "Username atau password salah",
        ));
    }

    let user = AdminUser {
        username: cfg.username,
        full_name: cfg.full_name,
    };
    let user_json = serde_json::to_value(&user).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    db::settings_set_json(&tx, SESSION_FLAG_KEY, &json!(true))
        .map_err(|e| HandlerErr::update("settings", e))?;
    db::settings_set_json(&tx, SESSION_USER_KEY, &user_json)
        .map_err(|e| HandlerErr::update("settings", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    tracing::info!(username = %user.username, "admin logged in");
    Ok(json!({ "adminUser": user_json }))
}

fn auth_session(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let admin = current_admin(conn)?;
    Ok(json!({
        "isLoggedIn": admin.is_some(),
        "adminUser": admin,
    }))
}

fn auth_logout(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    db::settings_delete(&tx, SESSION_FLAG_KEY).map_err(|e| HandlerErr::update("settings", e))?;
    db::settings_delete(&tx, SESSION_USER_KEY).map_err(|e| HandlerErr::update("settings", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    tracing::info!("admin logged out");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "auth.login" => Some(with_db(state, req, auth_login)),
        "auth.session" => Some(with_db(state, req, auth_session)),
        "auth.logout" => Some(with_db(state, req, auth_logout)),
        _ => None,
    }
}
