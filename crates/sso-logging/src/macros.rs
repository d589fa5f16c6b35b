//! ---
//! sso_section: "03-logging"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Structured logging adapters carrying request correlation fields."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---

/// Shared expansion for the level-specific macros.
#[doc(hidden)]
#[macro_export]
macro_rules! __sso_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            request_id = ctx.request_id.unwrap_or(""),
            user = ctx.user.unwrap_or(""),
            client_ip = ctx.client_ip.unwrap_or(""),
            module = ctx.module.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with request context.
#[macro_export]
macro_rules! sso_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__sso_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__sso_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with request context.
#[macro_export]
macro_rules! sso_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__sso_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__sso_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with request context.
#[macro_export]
macro_rules! sso_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__sso_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__sso_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with request context.
#[macro_export]
macro_rules! sso_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__sso_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__sso_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
