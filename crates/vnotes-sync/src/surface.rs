use vnotes_store::DocumentId;

/// The editing widget the active document is shown in.
pub trait EditSurface: Send + 'static {
    /// Replace what the surface displays. When `emit_change_event` is false the
    /// surface must not report the replacement back as a user edit.
    fn set_content(&mut self, content: &str, emit_change_event: bool);
}

/// Notifications for whoever presents the engine to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    Activated(DocumentId),
    Deactivated,
    /// A switch was requested mid-keystroke; answer with save, discard or cancel.
    SwitchPrompt {
        from: Option<DocumentId>,
        to: DocumentId,
    },
}
