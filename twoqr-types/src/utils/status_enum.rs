/// A numeric status a relying party does not know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown status code {0}")]
pub struct UnknownStatus(pub u16);

/// Generate an enum of HTTP-like status codes, each with the reason sent alongside it.
macro_rules! status_enum {
    ( $(#[$attr:meta])* $enum_name:ident {$($(#[$fattr:meta])* $name:ident: $code:literal => $reason:literal,)* } ) => {
        $(#[$attr])*
        #[derive(Debug, PartialEq, Eq, Clone, Copy)]
        #[repr(u16)]
        pub enum $enum_name {
            $($(#[$fattr])* $name = $code,)*
        }

        impl $enum_name {
            /// Human readable reason sent along with the code.
            pub fn reason(self) -> &'static str {
                match self {
                    $(Self::$name => $reason,)*
                }
            }
        }

        impl TryFrom<u16> for $enum_name {
            type Error = $crate::utils::status_enum::UnknownStatus;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $($code => Ok(Self::$name),)*
                    _ => Err($crate::utils::status_enum::UnknownStatus(value)),
                }
            }
        }

        impl From<$enum_name> for u16 {
            #[allow(clippy::as_conversions)]
            fn from(src: $enum_name) -> Self {
                src as u16
            }
        }
    }
}
