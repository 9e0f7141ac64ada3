#![allow(unused)]

// Without the `log` feature the arguments still type-check inside a closure
// that never runs, so values only logged do not turn into dead code.

macro_rules! trace {
    ($($tt:tt)*) => {
        #[cfg(feature = "log")]
        ::log::trace!($($tt)*);
        #[cfg(not(feature = "log"))]
        let _ = || ::std::format!($($tt)*);
    };
}

macro_rules! debug {
    ($($tt:tt)*) => {
        #[cfg(feature = "log")]
        ::log::debug!($($tt)*);
        #[cfg(not(feature = "log"))]
        let _ = || ::std::format!($($tt)*);
    };
}

macro_rules! warning {
    ($($tt:tt)*) => {
        #[cfg(feature = "log")]
        ::log::warn!($($tt)*);
        #[cfg(not(feature = "log"))]
        let _ = || ::std::format!($($tt)*);
    };
}

pub(crate) use {debug, trace, warning};
