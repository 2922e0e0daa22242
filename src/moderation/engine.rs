//! The moderation decision pipeline.
//!
//! Rules run in a fixed order and the first decisive one wins:
//!
//! 1. Known banned sticker → delete and warn
//! 2. Banned keyword → delete and ban
//! 3. Non-whitelisted link from a non-privileged sender → delete and warn
//! 4. Attachment classified explicit → delete and ban (and memoize stickers)
//! 5. Otherwise allow
//!
//! Cheap in-memory checks come before any media fetch or classifier call.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ModerationPolicy;
use crate::error::{ClassificationError, CommandError};
use crate::i18n::{DEFAULT_LOCALE, get_text};
use crate::utils::html_escape;

use super::authorization::{AuthorizationStore, Privilege};
use super::classifier::{ContentClassifier, MediaClassificationGate, NsfwVerdict};
use super::executor::AdminList;
use super::media::MediaFetcher;
use super::stickers::StickerBanCache;
use super::text_rules::{TextOutcome, TextRuleEngine};
use super::types::{
    Attachment, Message, REASON_BANNED_STICKER, REASON_EXPLICIT_MEDIA, REASON_UNAUTHORIZED_LINK,
    Verdict,
};

pub struct ModerationEngine {
    rules: TextRuleEngine,
    gate: MediaClassificationGate,
    fetcher: Arc<dyn MediaFetcher>,
    authorization: AuthorizationStore,
    stickers: StickerBanCache,
    ban_duration: Duration,
    fetch_timeout: Duration,
    warn_on_link: bool,
    scan_admin_media: bool,
}

impl ModerationEngine {
    pub fn new(
        policy: &ModerationPolicy,
        classifier: Arc<dyn ContentClassifier>,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Self {
        Self {
            rules: TextRuleEngine::from_policy(policy),
            gate: MediaClassificationGate::from_policy(classifier, policy),
            fetcher,
            authorization: AuthorizationStore::new(),
            stickers: StickerBanCache::new(),
            ban_duration: policy.ban_duration(),
            fetch_timeout: policy.fetch_timeout(),
            warn_on_link: policy.warn_on_link,
            scan_admin_media: policy.scan_admin_media,
        }
    }

    pub fn authorization(&self) -> &AuthorizationStore {
        &self.authorization
    }

    pub fn stickers(&self) -> &StickerBanCache {
        &self.stickers
    }

    /// Produce the verdict for one message.
    pub async fn evaluate(&self, msg: &Message) -> Verdict {
        let chat_id = msg.chat_id;

        if let Some(sticker_id) = msg.sticker_id()
            && self.stickers.is_banned(chat_id, sticker_id)
        {
            debug!("Sticker {} is banned in chat {}", sticker_id, chat_id);
            return self.warn(msg, REASON_BANNED_STICKER, "moderation.warn_sticker");
        }

        let privilege = self.authorization.privilege(chat_id, msg.sender_id);

        match self.rules.evaluate(msg.text.as_deref(), &msg.url_spans) {
            TextOutcome::KeywordViolation { keyword, category } => {
                info!(
                    "Keyword '{}' from user {} in chat {}",
                    keyword, msg.sender_id, chat_id
                );
                return Verdict::DeleteAndBan {
                    reason: category.to_string(),
                    ban_duration: self.ban_duration,
                };
            }
            TextOutcome::LinkPresent if !privilege.is_privileged() => {
                if self.warn_on_link {
                    return self.warn(msg, REASON_UNAUTHORIZED_LINK, "moderation.warn_link");
                }
                return Verdict::DeleteOnly {
                    reason: REASON_UNAUTHORIZED_LINK.to_string(),
                };
            }
            TextOutcome::LinkPresent => {
                debug!(
                    "User {} is {:?} in chat {}, link allowed",
                    msg.sender_id, privilege, chat_id
                );
            }
            TextOutcome::Clean => {}
        }

        let Some(attachment) = msg.attachment.as_ref() else {
            return Verdict::Allow;
        };

        if !self.should_scan(privilege) {
            debug!(
                "Skipping media scan for {:?} user {} in chat {}",
                privilege, msg.sender_id, chat_id
            );
            return Verdict::Allow;
        }

        let nsfw = self.inspect(attachment).await;
        if !nsfw.is_explicit {
            return Verdict::Allow;
        }

        info!(
            "Explicit {} from user {} in chat {}: {:?} ({:.2})",
            attachment.kind, msg.sender_id, chat_id, nsfw.matched_label, nsfw.score
        );

        if let Some(sticker_id) = msg.sticker_id() {
            self.stickers.ban(chat_id, sticker_id);
        }

        Verdict::DeleteAndBan {
            reason: REASON_EXPLICIT_MEDIA.to_string(),
            ban_duration: self.ban_duration,
        }
    }

    fn should_scan(&self, privilege: Privilege) -> bool {
        match privilege {
            Privilege::Owner => false,
            Privilege::Admin | Privilege::Authorized => self.scan_admin_media,
            Privilege::None => true,
        }
    }

    /// Fetch and classify an attachment. Never fails.
    async fn inspect(&self, attachment: &Attachment) -> NsfwVerdict {
        if !attachment.is_rasterizable() {
            debug!(
                "Allowing {} ({:?}): {}",
                attachment.kind,
                attachment.mime_type,
                ClassificationError::Unsupported
            );
            return NsfwVerdict::unsupported();
        }

        let media = match tokio::time::timeout(
            self.fetch_timeout,
            self.fetcher.resolve(attachment),
        )
        .await
        {
            Ok(Ok(media)) => media,
            Ok(Err(e)) => {
                warn!(
                    "Media fetch failed, allowing {}: {}",
                    attachment.kind,
                    ClassificationError::from(e)
                );
                return NsfwVerdict::failed();
            }
            Err(_) => {
                warn!(
                    "Media fetch failed, allowing {}: {}",
                    attachment.kind,
                    ClassificationError::Timeout(self.fetch_timeout)
                );
                return NsfwVerdict::failed();
            }
        };

        self.gate.classify(&media).await
    }

    fn warn(&self, msg: &Message, reason: &str, template: &str) -> Verdict {
        let warning_text = get_text(DEFAULT_LOCALE, template)
            .replace("{id}", &msg.sender_id.to_string())
            .replace("{name}", &html_escape(&msg.display_name()));

        Verdict::DeleteAndWarn {
            reason: reason.to_string(),
            warning_text,
        }
    }

    // ── Owner commands ──────────────────────────────────────────────

    pub fn refresh_admins(&self, chat_id: i64, admins: AdminList) {
        self.authorization
            .refresh_admins(chat_id, admins.admin_ids, admins.owner_id);
    }

    /// Reject callers that are not the chat's recorded owner.
    pub fn require_owner(&self, chat_id: i64, caller_id: u64) -> Result<(), CommandError> {
        if !self.authorization.is_known(chat_id) {
            return Err(CommandError::UnknownChat(chat_id));
        }
        if !self.authorization.is_owner(chat_id, caller_id) {
            return Err(CommandError::Unauthorized);
        }
        Ok(())
    }

    /// Returns `Ok(false)` if the user was already authorized.
    pub fn authorize(&self, chat_id: i64, caller_id: u64, user_id: u64) -> Result<bool, CommandError> {
        self.require_owner(chat_id, caller_id)?;
        Ok(self.authorization.authorize(chat_id, user_id))
    }

    /// Returns `Ok(false)` if the user was not authorized.
    pub fn unauthorize(
        &self,
        chat_id: i64,
        caller_id: u64,
        user_id: u64,
    ) -> Result<bool, CommandError> {
        self.require_owner(chat_id, caller_id)?;
        Ok(self.authorization.unauthorize(chat_id, user_id))
    }

    /// Returns `Ok(false)` if the sticker was already banned.
    pub fn ban_sticker(
        &self,
        chat_id: i64,
        caller_id: u64,
        sticker_id: &str,
    ) -> Result<bool, CommandError> {
        self.require_owner(chat_id, caller_id)?;
        Ok(self.stickers.ban(chat_id, sticker_id))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::error::FetchError;
    use crate::moderation::classifier::Detection;
    use crate::moderation::classifier::tests::ScriptedClassifier;
    use crate::moderation::media::MediaContent;
    use crate::moderation::types::{AttachmentKind, ViolationCategory};

    const CHAT: i64 = -100;
    const OWNER: u64 = 1;
    const ADMIN: u64 = 2;
    const USER: u64 = 3;

    struct StubFetcher {
        result: Result<MediaContent, FetchError>,
        delay: Option<Duration>,
        calls: Mutex<usize>,
    }

    impl StubFetcher {
        fn ok() -> Self {
            Self {
                result: Ok(MediaContent::Still(vec![0xFF, 0xD8])),
                delay: None,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl MediaFetcher for StubFetcher {
        async fn resolve(&self, _attachment: &Attachment) -> Result<MediaContent, FetchError> {
            *self.calls.lock() += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.result.clone()
        }
    }

    fn policy() -> ModerationPolicy {
        let mut policy = ModerationPolicy::default();
        policy.nsfw_labels = vec!["EXPLICIT_A".into()];
        policy.nsfw_threshold = 0.6;
        policy.keywords = [("free crypto".to_string(), ViolationCategory::Promotional)]
            .into_iter()
            .collect();
        policy.link_whitelist = vec!["github.com".into()];
        policy
    }

    fn explicit() -> Arc<ScriptedClassifier> {
        Arc::new(ScriptedClassifier::always(vec![Detection::new(
            "EXPLICIT_A",
            0.82,
        )]))
    }

    fn clean() -> Arc<ScriptedClassifier> {
        Arc::new(ScriptedClassifier::always(vec![]))
    }

    fn engine_with(
        policy: &ModerationPolicy,
        classifier: Arc<ScriptedClassifier>,
        fetcher: Arc<StubFetcher>,
    ) -> ModerationEngine {
        crate::i18n::init();
        ModerationEngine::new(policy, classifier, fetcher)
    }

    fn engine(classifier: Arc<ScriptedClassifier>) -> ModerationEngine {
        engine_with(&policy(), classifier, Arc::new(StubFetcher::ok()))
    }

    fn with_admins(engine: &ModerationEngine) {
        engine.refresh_admins(
            CHAT,
            AdminList {
                owner_id: OWNER,
                admin_ids: vec![ADMIN],
            },
        );
    }

    fn msg(sender: u64) -> Message {
        Message::new(CHAT, 10, sender).sender_handle("someone")
    }

    #[tokio::test]
    async fn empty_message_is_allowed() {
        let classifier = explicit();
        let e = engine(classifier.clone());
        assert_eq!(e.evaluate(&msg(USER)).await, Verdict::Allow);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn keyword_takes_precedence_over_link() {
        let e = engine(clean());
        let m = msg(USER)
            .text("FREE CRYPTO at http://evil.example/x")
            .url_span("http://evil.example/x");

        assert_eq!(
            e.evaluate(&m).await,
            Verdict::DeleteAndBan {
                reason: "promotional".into(),
                ban_duration: Duration::from_secs(86_400),
            }
        );
    }

    #[tokio::test]
    async fn keyword_applies_to_privileged_senders() {
        let e = engine(clean());
        with_admins(&e);
        let m = msg(ADMIN).text("free crypto giveaway");
        assert!(matches!(e.evaluate(&m).await, Verdict::DeleteAndBan { .. }));
    }

    // Scenario A
    #[tokio::test]
    async fn link_in_unknown_chat_is_warned() {
        let e = engine(clean());
        let m = msg(USER)
            .text("check this out http://evil.example/x")
            .url_span("http://evil.example/x");

        assert!(!e.authorization().is_privileged(CHAT, USER));
        match e.evaluate(&m).await {
            Verdict::DeleteAndWarn {
                reason,
                warning_text,
            } => {
                assert_eq!(reason, "unauthorized link");
                assert!(warning_text.contains("someone"));
            }
            other => panic!("expected DeleteAndWarn, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn link_delete_only_when_warnings_disabled() {
        let mut p = policy();
        p.warn_on_link = false;
        let e = engine_with(&p, clean(), Arc::new(StubFetcher::ok()));
        let m = msg(USER).url_span("evil.example");

        assert_eq!(
            e.evaluate(&m).await,
            Verdict::DeleteOnly {
                reason: "unauthorized link".into()
            }
        );
    }

    #[tokio::test]
    async fn whitelisted_link_falls_through_to_media() {
        let e = engine(explicit());
        let m = msg(USER)
            .text("https://github.com/x")
            .url_span("https://github.com/x")
            .attachment(Attachment::photo("p"));

        assert!(matches!(
            e.evaluate(&m).await,
            Verdict::DeleteAndBan { ref reason, .. } if reason == "explicit media"
        ));

        let text_only = msg(USER).url_span("https://github.com/x");
        assert_eq!(e.evaluate(&text_only).await, Verdict::Allow);
    }

    #[tokio::test]
    async fn privileged_link_still_scans_media() {
        let e = engine(explicit());
        with_admins(&e);
        let m = msg(ADMIN)
            .url_span("http://evil.example")
            .attachment(Attachment::photo("p"));

        assert!(matches!(e.evaluate(&m).await, Verdict::DeleteAndBan { .. }));
    }

    #[tokio::test]
    async fn authorized_user_may_post_links() {
        let e = engine(clean());
        with_admins(&e);
        e.authorize(CHAT, OWNER, USER).unwrap();
        let m = msg(USER).url_span("http://evil.example");
        assert_eq!(e.evaluate(&m).await, Verdict::Allow);
    }

    #[tokio::test]
    async fn owner_is_never_media_scanned() {
        let classifier = explicit();
        let e = engine(classifier.clone());
        with_admins(&e);
        let m = msg(OWNER).attachment(Attachment::photo("p"));

        assert_eq!(e.evaluate(&m).await, Verdict::Allow);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn admins_exempt_from_media_when_configured() {
        let mut p = policy();
        p.scan_admin_media = false;
        let e = engine_with(&p, explicit(), Arc::new(StubFetcher::ok()));
        with_admins(&e);

        let admin = msg(ADMIN).attachment(Attachment::photo("p"));
        assert_eq!(e.evaluate(&admin).await, Verdict::Allow);

        let user = msg(USER).attachment(Attachment::photo("p"));
        assert!(matches!(e.evaluate(&user).await, Verdict::DeleteAndBan { .. }));
    }

    // Scenario B
    #[tokio::test]
    async fn explicit_photo_is_banned() {
        let e = engine(explicit());
        let m = msg(USER).attachment(Attachment::photo("p"));
        assert_eq!(
            e.evaluate(&m).await,
            Verdict::DeleteAndBan {
                reason: "explicit media".into(),
                ban_duration: Duration::from_secs(86_400),
            }
        );
    }

    // Scenario C
    #[tokio::test]
    async fn explicit_sticker_is_memoized() {
        let e = engine(explicit());
        let m = msg(USER).attachment(Attachment::sticker("file-1", "S1"));

        assert!(matches!(e.evaluate(&m).await, Verdict::DeleteAndBan { .. }));
        assert!(e.stickers().is_banned(CHAT, "S1"));
    }

    // Scenario D
    #[tokio::test]
    async fn resent_banned_sticker_is_warned() {
        let classifier = explicit();
        let e = engine(classifier.clone());
        e.stickers().ban(CHAT, "S1");
        let m = msg(USER)
            .text("")
            .attachment(Attachment::sticker("file-2", "S1"));

        match e.evaluate(&m).await {
            Verdict::DeleteAndWarn { reason, .. } => assert_eq!(reason, "banned sticker"),
            other => panic!("expected DeleteAndWarn, got {:?}", other),
        }
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn banned_sticker_shortcut_precedes_keyword() {
        let e = engine(clean());
        e.stickers().ban(CHAT, "S1");
        let m = msg(USER)
            .text("free crypto")
            .attachment(Attachment::sticker("f", "S1"));
        assert!(matches!(e.evaluate(&m).await, Verdict::DeleteAndWarn { .. }));
    }

    #[tokio::test]
    async fn explicit_photo_does_not_touch_sticker_cache() {
        let e = engine(explicit());
        let m = msg(USER).attachment(Attachment::photo("p"));
        e.evaluate(&m).await;
        assert_eq!(e.stickers().banned_count(CHAT), 0);
    }

    // Scenario E
    #[tokio::test(start_paused = true)]
    async fn classifier_timeout_is_fail_open() {
        let mut slow = ScriptedClassifier::always(vec![Detection::new("EXPLICIT_A", 0.99)]);
        slow.delay = Some(Duration::from_secs(3600));
        let e = engine_with(&policy(), Arc::new(slow), Arc::new(StubFetcher::ok()));

        let m = msg(USER).attachment(Attachment::photo("p"));
        assert_eq!(e.evaluate(&m).await, Verdict::Allow);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_timeout_is_fail_open() {
        let fetcher = Arc::new(StubFetcher {
            delay: Some(Duration::from_secs(3600)),
            ..StubFetcher::ok()
        });
        let classifier = explicit();
        let e = engine_with(&policy(), classifier.clone(), fetcher);

        let m = msg(USER).attachment(Attachment::photo("p"));
        assert_eq!(e.evaluate(&m).await, Verdict::Allow);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_does_not_mask_other_rules() {
        let fetcher = Arc::new(StubFetcher {
            delay: Some(Duration::from_secs(3600)),
            ..StubFetcher::ok()
        });
        let e = engine_with(&policy(), explicit(), fetcher);
        let m = msg(USER)
            .url_span("http://evil.example")
            .attachment(Attachment::photo("p"));
        assert!(matches!(e.evaluate(&m).await, Verdict::DeleteAndWarn { .. }));
    }

    #[tokio::test]
    async fn fetch_error_is_fail_open() {
        let fetcher = Arc::new(StubFetcher {
            result: Err(FetchError::Expired),
            ..StubFetcher::ok()
        });
        let e = engine_with(&policy(), explicit(), fetcher);
        let m = msg(USER).attachment(Attachment::photo("p"));
        assert_eq!(e.evaluate(&m).await, Verdict::Allow);
    }

    #[tokio::test]
    async fn vector_sticker_is_unsupported_not_failed() {
        let fetcher = Arc::new(StubFetcher::ok());
        let classifier = explicit();
        let e = engine_with(&policy(), classifier.clone(), fetcher.clone());
        let m = msg(USER).attachment(Attachment::sticker("f", "TGS").animated_vector(true));

        assert_eq!(e.evaluate(&m).await, Verdict::Allow);
        assert_eq!(*fetcher.calls.lock(), 0);
        assert_eq!(classifier.calls(), 0);
        assert!(!e.stickers().is_banned(CHAT, "TGS"));
    }

    #[tokio::test]
    async fn non_media_document_is_skipped() {
        let fetcher = Arc::new(StubFetcher::ok());
        let e = engine_with(&policy(), explicit(), fetcher.clone());
        let doc = Attachment::new(AttachmentKind::Document, "d").mime_type("application/zip");

        assert_eq!(e.evaluate(&msg(USER).attachment(doc)).await, Verdict::Allow);
        assert_eq!(*fetcher.calls.lock(), 0);
    }

    #[test]
    fn commands_require_owner() {
        let e = engine(clean());
        assert_eq!(
            e.authorize(CHAT, OWNER, USER),
            Err(CommandError::UnknownChat(CHAT))
        );

        with_admins(&e);
        assert_eq!(e.authorize(CHAT, ADMIN, USER), Err(CommandError::Unauthorized));
        assert!(!e.authorization().is_privileged(CHAT, USER));

        assert_eq!(e.authorize(CHAT, OWNER, USER), Ok(true));
        assert_eq!(e.authorize(CHAT, OWNER, USER), Ok(false));
        assert_eq!(e.unauthorize(CHAT, USER, USER), Err(CommandError::Unauthorized));
        assert_eq!(e.unauthorize(CHAT, OWNER, USER), Ok(true));
    }

    #[test]
    fn ban_sticker_command() {
        let e = engine(clean());
        with_admins(&e);
        assert_eq!(e.ban_sticker(CHAT, USER, "S9"), Err(CommandError::Unauthorized));
        assert!(!e.stickers().is_banned(CHAT, "S9"));

        assert_eq!(e.ban_sticker(CHAT, OWNER, "S9"), Ok(true));
        assert_eq!(e.ban_sticker(CHAT, OWNER, "S9"), Ok(false));
        assert!(e.stickers().is_banned(CHAT, "S9"));
    }

    #[tokio::test]
    async fn concurrent_evaluations_of_same_sticker() {
        let e = Arc::new(engine(explicit()));
        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let e = e.clone();
                tokio::spawn(async move {
                    let m = Message::new(CHAT, i, USER).attachment(Attachment::sticker("f", "S1"));
                    e.evaluate(&m).await
                })
            })
            .collect();

        for task in tasks {
            let verdict = task.await.unwrap();
            assert!(!verdict.is_allow());
        }
        assert_eq!(e.stickers().banned_count(CHAT), 1);
    }
}
