//! Password account helpers layered on the session.

use crate::password::hash_password;
use crate::session::{LoginResult, SessionManager};
use crate::{ClientError, ClientResult, Correlator};
use serde::Serialize;
use serde_json::{Map, Value};
use std::rc::Rc;
use tracing::warn;

/// Fields for `create_user`. At least one of `username` / `email` is
/// expected by the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateUserOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip)]
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
}

#[derive(Clone)]
pub struct Accounts {
    session: Rc<SessionManager>,
    correlator: Rc<Correlator>,
}

impl Accounts {
    pub(crate) fn new(session: Rc<SessionManager>, correlator: Rc<Correlator>) -> Self {
        Self { session, correlator }
    }

    /// Create an account and log in as it.
    pub fn create_user(
        &self,
        options: CreateUserOptions,
        callback: impl FnOnce(ClientResult<LoginResult>) + 'static,
    ) {
        let mut request = match serde_json::to_value(&options) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        request.insert("password".to_string(), hash_password(&options.password));
        self.session
            .login_call("createUser", vec![Value::Object(request)], Box::new(callback));
    }

    /// `old_password` may be `None` for accounts without one.
    pub fn change_password(
        &self,
        old_password: Option<&str>,
        new_password: &str,
        callback: impl FnOnce(ClientResult<()>) + 'static,
    ) -> ClientResult<()> {
        if new_password.is_empty() {
            return reject(callback, "Password may not be empty");
        }
        let old = old_password.map(hash_password).unwrap_or(Value::Null);
        self.call_unit(
            "changePassword",
            vec![old, hash_password(new_password)],
            callback,
        )
    }

    pub fn forgot_password(
        &self,
        email: &str,
        callback: impl FnOnce(ClientResult<()>) + 'static,
    ) -> ClientResult<()> {
        if email.is_empty() {
            return reject(callback, "Must pass options.email");
        }
        let mut options = Map::new();
        options.insert("email".to_string(), Value::String(email.to_string()));
        self.call_unit("forgotPassword", vec![Value::Object(options)], callback)
    }

    /// Reset with an emailed token; on success the session resumes with the
    /// token the server returns.
    pub fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        callback: impl FnOnce(ClientResult<()>) + 'static,
    ) -> ClientResult<()> {
        if new_password.is_empty() {
            return reject(callback, "Must pass a new password");
        }
        let session = Rc::downgrade(&self.session);
        self.correlator
            .invoke(
                "resetPassword",
                vec![Value::String(token.to_string()), hash_password(new_password)],
                move |outcome| match outcome {
                    Ok(result) => {
                        let token = result.get("token").and_then(Value::as_str).map(str::to_string);
                        match (session.upgrade(), token) {
                            (Some(session), Some(token)) => session.login_with_token(Some(token)),
                            (_, None) => warn!("resetPassword result carried no token"),
                            _ => {}
                        }
                        callback(Ok(()));
                    }
                    Err(e) => callback(Err(ClientError::Remote(e))),
                },
            )
            .map(|_| ())
    }

    fn call_unit(
        &self,
        method: &str,
        params: Vec<Value>,
        callback: impl FnOnce(ClientResult<()>) + 'static,
    ) -> ClientResult<()> {
        self.correlator
            .invoke(method, params, move |outcome| {
                callback(outcome.map(|_| ()).map_err(ClientError::Remote))
            })
            .map(|_| ())
    }
}

fn reject(callback: impl FnOnce(ClientResult<()>), reason: &str) -> ClientResult<()> {
    let err = ClientError::Validation(reason.to_string());
    callback(Err(err.clone()));
    Err(err)
}
