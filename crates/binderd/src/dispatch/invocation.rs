//! The [`Request`] implementation handed to verb callbacks.

use binder_plugins::{Argument, Context, PluginId, Request, RequestError};
use serde_json::Value;
use tracing::warn;

use super::DISPATCH_TARGET;
use super::call::Call;
use super::reply::Reply;
use crate::session::Session;

/// One callback invocation: the call, the calling plugin's identity, and the
/// attached session. Records the first reply only.
pub(crate) struct Invocation<'a> {
    call: &'a Call,
    plugin: PluginId,
    session: Option<&'a mut Session>,
    reply: Option<Reply>,
    close_requested: bool,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        call: &'a Call,
        plugin: PluginId,
        session: Option<&'a mut Session>,
    ) -> Self {
        Self {
            call,
            plugin,
            session,
            reply: None,
            close_requested: false,
        }
    }

    /// Whether the callback asked for its session to end.
    pub(crate) const fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub(crate) fn into_reply(self) -> Option<Reply> {
        self.reply
    }

    fn record(&mut self, reply: Reply) {
        if self.reply.is_some() {
            warn!(
                target: DISPATCH_TARGET,
                api = self.call.api(),
                verb = self.call.verb(),
                ignored = %reply.status,
                "callback replied more than once"
            );
            return;
        }
        self.reply = Some(reply);
    }

    fn session_mut(&mut self) -> Result<&mut Session, RequestError> {
        self.session.as_deref_mut().ok_or(RequestError::NoSession)
    }
}

impl Request for Invocation<'_> {
    fn argument(&self, name: &str) -> Option<Argument<'_>> {
        self.call.argument(name)
    }

    fn arguments(&self) -> Vec<Argument<'_>> {
        self.call.arguments()
    }

    fn session_token(&self) -> Option<&str> {
        self.session.as_deref().map(Session::token)
    }

    fn success(&mut self, response: Option<Value>, info: Option<String>) {
        self.record(Reply::success(response, info));
    }

    fn fail(&mut self, status: &str, info: Option<String>) {
        self.record(Reply::failure(status, info));
    }

    fn context(&self) -> Option<&Context> {
        self.session
            .as_deref()
            .and_then(|session| session.context(self.plugin))
    }

    fn context_mut(&mut self) -> Option<&mut Context> {
        let plugin = self.plugin;
        self.session
            .as_deref_mut()
            .and_then(|session| session.context_mut(plugin))
    }

    fn set_context(&mut self, context: Context) -> Result<(), RequestError> {
        let plugin = self.plugin;
        self.session_mut()?.set_context(plugin, context);
        Ok(())
    }

    fn clear_context(&mut self) -> Result<(), RequestError> {
        let plugin = self.plugin;
        self.session_mut()?.clear_context(plugin);
        Ok(())
    }

    fn level_of_assurance(&self) -> Option<u8> {
        self.session.as_deref().map(Session::level_of_assurance)
    }

    fn set_level_of_assurance(&mut self, level: u8) -> Result<(), RequestError> {
        self.session_mut()?.set_level_of_assurance(level)
    }

    fn close_session(&mut self) -> Result<(), RequestError> {
        self.session_mut()?;
        self.close_requested = true;
        Ok(())
    }
}
