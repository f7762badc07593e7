//! Utility macros for reducing boilerplate

/// Implement `FromRef<AppState>` so handlers can extract one field of the
/// shared state directly.
///
/// # Example
/// ```ignore
/// impl_from_ref!(Arc<QueryPipeline>, pipeline);
/// // Expands to:
/// impl axum::extract::FromRef<AppState> for Arc<QueryPipeline> {
///     fn from_ref(state: &AppState) -> Self {
///         state.pipeline.clone()
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $type {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
