use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    config::Config,
    domain::{Chat, UserId},
    messaging::{port::MessagingPort, types::IncomingUpdate},
};

// ============== Authorization ==============

/// Global allow-list gate. An empty list lets everyone in.
pub fn is_authorized(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    allowed_users.is_empty() || allowed_users.contains(&user_id.0)
}

// ============== Chat Admin Checks ==============

/// Outcome of an admin check.
///
/// Lookup failures are kept apart from real denials so they can be logged, but
/// every boolean entry point treats them as a denial.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminCheck {
    Allowed,
    Denied,
    LookupFailed,
}

impl AdminCheck {
    pub fn is_allowed(self) -> bool {
        self == AdminCheck::Allowed
    }
}

/// Live admin checks against the messaging platform. Nothing is cached.
#[derive(Clone)]
pub struct AccessControl {
    messenger: Arc<dyn MessagingPort>,
    allowed_users: Vec<i64>,
}

impl AccessControl {
    pub fn new(messenger: Arc<dyn MessagingPort>, cfg: &Config) -> Self {
        Self {
            messenger,
            allowed_users: cfg.allowed_users.clone(),
        }
    }

    pub async fn admin_status(&self, user_id: UserId, chat: &Chat) -> AdminCheck {
        match self.messenger.list_admins(chat).await {
            Ok(admins) if admins.contains(&user_id) => AdminCheck::Allowed,
            Ok(_) => AdminCheck::Denied,
            Err(e) => {
                warn!(
                    chat_id = chat.id.0,
                    user_id = user_id.0,
                    error = %e,
                    "admin list lookup failed, denying"
                );
                AdminCheck::LookupFailed
            }
        }
    }

    /// Whether `user_id` administers `chat`. Lookup errors read as "no".
    pub async fn is_user_admin_of_chat(&self, user_id: UserId, chat: &Chat) -> bool {
        self.admin_status(user_id, chat).await.is_allowed()
    }

    /// Admin status of whoever issued `update` in the chat it came from.
    ///
    /// Private chats are always allowed; they have no admins.
    pub async fn requester_admin_status(&self, update: &IncomingUpdate) -> AdminCheck {
        let chat = update.chat();
        if !chat.kind.is_admin_context() {
            return AdminCheck::Allowed;
        }
        let Some(actor) = update.actor() else {
            return AdminCheck::Denied;
        };
        self.admin_status(actor, chat).await
    }

    pub async fn check_requester_is_admin(&self, update: &IncomingUpdate) -> bool {
        self.requester_admin_status(update).await.is_allowed()
    }

    pub fn is_actor_allowed(&self, update: &IncomingUpdate) -> bool {
        let Some(actor) = update.actor() else {
            info!(chat_id = update.chat().id.0, "update without actor rejected");
            return false;
        };
        if is_authorized(Some(actor), &self.allowed_users) {
            return true;
        }
        info!(user_id = actor.0, "user not allowed");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, ChatKind};
    use crate::messaging::types::{CallbackQuery, InboundMessage};
    use crate::testing::{test_config, FakeMessenger};

    fn chat(id: i64, kind: ChatKind) -> Chat {
        Chat {
            id: ChatId(id),
            kind,
            title: None,
            username: None,
        }
    }

    fn message_from(chat: Chat, sender: Option<i64>) -> IncomingUpdate {
        IncomingUpdate::Message(InboundMessage {
            chat,
            sender: sender.map(UserId),
            text: "/sub".to_string(),
            entities: vec![],
            caption: String::new(),
            caption_entities: vec![],
        })
    }

    fn callback_from(chat: Chat, sender: i64) -> IncomingUpdate {
        IncomingUpdate::Callback(CallbackQuery {
            chat,
            sender: UserId(sender),
            callback_id: "cb".to_string(),
            data: "unsub:1".to_string(),
            message: None,
        })
    }

    fn access(messenger: Arc<FakeMessenger>, allowed: &[i64]) -> AccessControl {
        let mut cfg = test_config();
        cfg.allowed_users = allowed.to_vec();
        AccessControl::new(messenger, &cfg)
    }

    #[test]
    fn authorization_empty_list_allows_everyone() {
        assert!(is_authorized(Some(UserId(1)), &[]));
        assert!(is_authorized(Some(UserId(-5)), &[]));
        assert!(!is_authorized(None, &[]));
    }

    #[test]
    fn authorization_requires_listed_user() {
        assert!(is_authorized(Some(UserId(2)), &[1, 2]));
        assert!(!is_authorized(Some(UserId(3)), &[1, 2]));
    }

    #[tokio::test]
    async fn private_chats_skip_admin_lookup() {
        let api = Arc::new(FakeMessenger::new());
        let ac = access(api.clone(), &[]);

        let upd = message_from(chat(1, ChatKind::Private), Some(7));
        assert!(ac.check_requester_is_admin(&upd).await);
        assert_eq!(api.admin_lookups(), 0);
    }

    #[tokio::test]
    async fn group_requires_admin_membership() {
        let api = Arc::new(FakeMessenger::new());
        api.set_admins(-100, &[7]);
        let ac = access(api.clone(), &[]);

        for kind in [ChatKind::Group, ChatKind::Supergroup, ChatKind::Channel] {
            assert!(
                ac.check_requester_is_admin(&message_from(chat(-100, kind), Some(7)))
                    .await
            );
            assert!(
                !ac.check_requester_is_admin(&message_from(chat(-100, kind), Some(8)))
                    .await
            );
        }
    }

    #[tokio::test]
    async fn callbacks_are_checked_like_messages() {
        let api = Arc::new(FakeMessenger::new());
        api.set_admins(-100, &[7]);
        let ac = access(api.clone(), &[]);

        assert!(
            ac.check_requester_is_admin(&callback_from(chat(-100, ChatKind::Supergroup), 7))
                .await
        );
        assert!(
            !ac.check_requester_is_admin(&callback_from(chat(-100, ChatKind::Supergroup), 9))
                .await
        );
    }

    #[tokio::test]
    async fn lookup_failure_fails_closed() {
        let api = Arc::new(FakeMessenger::new());
        let ac = access(api.clone(), &[]);

        for kind in [
            ChatKind::Group,
            ChatKind::Supergroup,
            ChatKind::Channel,
            ChatKind::ChannelPrivate,
        ] {
            let upd = message_from(chat(-200, kind), Some(7));
            assert_eq!(
                ac.requester_admin_status(&upd).await,
                AdminCheck::LookupFailed
            );
            assert!(!ac.check_requester_is_admin(&upd).await);
        }
        assert!(
            !ac.is_user_admin_of_chat(UserId(7), &chat(-200, ChatKind::Channel))
                .await
        );
    }

    #[tokio::test]
    async fn anonymous_sender_in_group_is_denied() {
        let api = Arc::new(FakeMessenger::new());
        api.set_admins(-100, &[7]);
        let ac = access(api, &[]);
        let upd = message_from(chat(-100, ChatKind::Group), None);
        assert_eq!(ac.requester_admin_status(&upd).await, AdminCheck::Denied);
    }

    #[test]
    fn allow_list_gate() {
        let api = Arc::new(FakeMessenger::new());
        let open = access(api.clone(), &[]);
        let closed = access(api, &[1]);

        let from_1 = message_from(Chat::private(1), Some(1));
        let from_2 = message_from(Chat::private(2), Some(2));
        let anonymous = message_from(chat(-1, ChatKind::Channel), None);

        assert!(open.is_actor_allowed(&from_1));
        assert!(open.is_actor_allowed(&from_2));
        assert!(!open.is_actor_allowed(&anonymous));

        assert!(closed.is_actor_allowed(&from_1));
        assert!(!closed.is_actor_allowed(&from_2));
        assert!(closed.is_actor_allowed(&callback_from(Chat::private(1), 1)));
    }
}
