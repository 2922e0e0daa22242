//! Event handler system.
//!
//! Every group message passes through moderation, commands included. A
//! message that triggers a verdict never reaches the command handlers.

pub mod moderation;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;

/// Put `handlers` behind the moderation pass.
pub fn moderated(handlers: UpdateHandler<anyhow::Error>) -> UpdateHandler<anyhow::Error> {
    Update::filter_message()
        .filter_async(moderation::passes_moderation)
        .branch(handlers)
}

#[cfg(test)]
mod tests {
    use std::ops::ControlFlow;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::bot::dispatcher::tests::{OWNER, test_state};
    use crate::moderation::AdminList;
    use crate::moderation::executor::tests::RecordingGateway;

    const CHAT: i64 = -1001;

    fn update(text: &str, entities: serde_json::Value) -> Update {
        // Parse from a string: teloxide's `UpdateKind` decoder needs borrowed keys.
        serde_json::from_str(&json!({
            "update_id": 1,
            "message": {
                "message_id": 7,
                "date": 1_700_000_000,
                "chat": { "id": CHAT, "type": "supergroup", "title": "test" },
                "from": { "id": 42, "is_bot": false, "first_name": "Mallory" },
                "text": text,
                "entities": entities,
            }
        })
        .to_string())
        .unwrap()
    }

    fn gateway() -> Arc<RecordingGateway> {
        Arc::new(RecordingGateway {
            admins: parking_lot::Mutex::new(Some(AdminList {
                owner_id: OWNER,
                admin_ids: vec![2],
            })),
            ..Default::default()
        })
    }

    /// Dispatch through the moderated schema with a counting command handler.
    async fn dispatch(gw: Arc<RecordingGateway>, update: Update) -> usize {
        let hits = Arc::new(AtomicUsize::new(0));
        let commands = dptree::endpoint(|hits: Arc<AtomicUsize>| async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(())
        });

        let result = moderated(commands)
            .dispatch(dptree::deps![update, test_state(gw), hits.clone()])
            .await;
        if let ControlFlow::Break(outcome) = result {
            outcome.unwrap();
        }
        hits.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn command_with_unauthorized_link_is_moderated() {
        let gw = gateway();
        let text = "/authorize free crypto http://evil.example";
        let entities = json!([
            { "type": "bot_command", "offset": 0, "length": 10 },
            { "type": "url", "offset": 23, "length": 19 },
        ]);

        let hits = dispatch(gw.clone(), update(text, entities)).await;

        assert_eq!(hits, 0);
        assert_eq!(*gw.deleted.lock(), vec![(CHAT, 7)]);
        let banned = gw.banned.lock();
        assert_eq!(banned.len(), 1);
        assert_eq!((banned[0].0, banned[0].1), (CHAT, 42));
        assert_eq!(gw.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn command_with_only_a_link_is_moderated() {
        let gw = gateway();
        let entities = json!([
            { "type": "bot_command", "offset": 0, "length": 10 },
            { "type": "url", "offset": 11, "length": 19 },
        ]);

        let hits = dispatch(gw.clone(), update("/authorize http://evil.example", entities)).await;

        assert_eq!(hits, 0);
        assert_eq!(*gw.deleted.lock(), vec![(CHAT, 7)]);
        assert!(gw.banned.lock().is_empty());
        assert_eq!(gw.scheduled.lock().len(), 1);
    }

    #[tokio::test]
    async fn clean_command_reaches_handlers() {
        let gw = gateway();
        let entities = json!([{ "type": "bot_command", "offset": 0, "length": 10 }]);

        let hits = dispatch(gw.clone(), update("/authorize 42", entities)).await;

        assert_eq!(hits, 1);
        assert!(gw.deleted.lock().is_empty());
        assert!(gw.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn private_chats_are_not_moderated() {
        let gw = gateway();
        let update: Update = serde_json::from_str(&json!({
            "update_id": 2,
            "message": {
                "message_id": 3,
                "date": 1_700_000_000,
                "chat": { "id": 42, "type": "private", "first_name": "Mallory" },
                "from": { "id": 42, "is_bot": false, "first_name": "Mallory" },
                "text": "/start http://evil.example",
                "entities": [{ "type": "url", "offset": 7, "length": 19 }],
            }
        })
        .to_string())
        .unwrap();

        assert_eq!(dispatch(gw.clone(), update).await, 1);
        assert!(gw.deleted.lock().is_empty());
        assert_eq!(*gw.admin_calls.lock(), 0);
    }
}
