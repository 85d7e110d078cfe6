//! Optional built-in logger backend. Mirrors the teacher's
//! `builtin_env_logger` feature: a host that wants its own `log` backend
//! disables the default feature and installs one before calling
//! [`crate::heap::HeapBuilder::build`].

#[cfg(feature = "builtin_env_logger")]
pub fn try_init() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .try_init();
    });
}

#[cfg(not(feature = "builtin_env_logger"))]
pub fn try_init() {}
