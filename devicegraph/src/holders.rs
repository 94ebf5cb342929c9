//! Holder kinds, the edges of a devicegraph.
//!
//! [`User`], [`FilesystemUser`], [`MdUser`] and [`LvmPvUser`] all model a
//! "uses" relation and answer `is_user()`. [`Subdevice`] models containment.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::{error::DevicegraphError, sid::Sid, types::HolderKind};

fn active() -> bool {
    true
}

/// Common interface of all user-like holders.
pub trait UserHolder: Debug {
    fn sid(&self) -> Sid;
    fn is_active(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub sid: Sid,
    #[serde(default = "active")]
    pub active: bool,
}

impl User {
    pub fn new(sid: Sid) -> Self {
        Self { sid, active: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subdevice {
    pub sid: Sid,
    #[serde(default = "active")]
    pub active: bool,
}

impl Subdevice {
    pub fn new(sid: Sid) -> Self {
        Self { sid, active: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemUser {
    pub sid: Sid,
    #[serde(default = "active")]
    pub active: bool,
    /// The block device holds an external journal of the filesystem.
    #[serde(default)]
    pub journal: bool,
}

impl FilesystemUser {
    pub fn new(sid: Sid) -> Self {
        Self {
            sid,
            active: true,
            journal: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MdUser {
    pub sid: Sid,
    #[serde(default = "active")]
    pub active: bool,
    #[serde(default)]
    pub spare: bool,
    #[serde(default)]
    pub faulty: bool,
    /// Position of the member in the array.
    #[serde(default)]
    pub sort_key: u32,
}

impl MdUser {
    pub fn new(sid: Sid, sort_key: u32) -> Self {
        Self {
            sid,
            active: true,
            spare: false,
            faulty: false,
            sort_key,
        }
    }

    /// Members that carry data, i.e. neither spare nor faulty.
    pub fn is_data_member(&self) -> bool {
        !self.spare && !self.faulty
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvmPvUser {
    pub sid: Sid,
    #[serde(default = "active")]
    pub active: bool,
}

impl LvmPvUser {
    pub fn new(sid: Sid) -> Self {
        Self { sid, active: true }
    }
}

macro_rules! holder_kinds {
    ($( $variant:ident => $is:ident, $as:ident, $to:ident, $to_mut:ident; )*) => {
        /// A holder of a devicegraph.
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(tag = "kind", rename_all = "kebab-case")]
        pub enum Holder {
            $( $variant($variant), )*
        }

        /// Borrowed view of a holder, typed to its concrete kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum HolderRef<'a> {
            $( $variant(&'a $variant), )*
        }

        impl Holder {
            pub fn kind(&self) -> HolderKind {
                match self {
                    $( Self::$variant(_) => HolderKind::$variant, )*
                }
            }

            pub fn sid(&self) -> Sid {
                match self {
                    $( Self::$variant(holder) => holder.sid, )*
                }
            }

            pub(crate) fn set_sid(&mut self, sid: Sid) {
                match self {
                    $( Self::$variant(holder) => holder.sid = sid, )*
                }
            }

            /// Inactive holders describe relations that do not exist on the
            /// system (yet) and are skipped by default traversals.
            pub fn is_active(&self) -> bool {
                match self {
                    $( Self::$variant(holder) => holder.active, )*
                }
            }

            pub fn set_active(&mut self, active: bool) {
                match self {
                    $( Self::$variant(holder) => holder.active = active, )*
                }
            }

            pub fn downcast(&self) -> HolderRef<'_> {
                match self {
                    $( Self::$variant(holder) => HolderRef::$variant(holder), )*
                }
            }

            $(
                pub fn $is(&self) -> bool {
                    matches!(self, Self::$variant(_))
                }

                pub fn $as(&self) -> Option<&$variant> {
                    match self {
                        Self::$variant(holder) => Some(holder),
                        _ => None,
                    }
                }

                pub fn $to(&self) -> Result<&$variant, DevicegraphError> {
                    match self {
                        Self::$variant(holder) => Ok(holder),
                        other => Err(other.wrong_type(HolderKind::$variant.to_string())),
                    }
                }

                pub fn $to_mut(&mut self) -> Result<&mut $variant, DevicegraphError> {
                    match self {
                        Self::$variant(holder) => Ok(holder),
                        other => Err(other.wrong_type(HolderKind::$variant.to_string())),
                    }
                }
            )*
        }

        impl HolderRef<'_> {
            pub fn kind(&self) -> HolderKind {
                match self {
                    $( Self::$variant(_) => HolderKind::$variant, )*
                }
            }

            pub fn sid(&self) -> Sid {
                match self {
                    $( Self::$variant(holder) => holder.sid, )*
                }
            }
        }

        $(
            impl From<$variant> for Holder {
                fn from(holder: $variant) -> Self {
                    Self::$variant(holder)
                }
            }
        )*
    };
}

holder_kinds! {
    User => is_plain_user, as_plain_user, to_plain_user, to_plain_user_mut;
    Subdevice => is_subdevice, as_subdevice, to_subdevice, to_subdevice_mut;
    FilesystemUser => is_filesystem_user, as_filesystem_user, to_filesystem_user, to_filesystem_user_mut;
    MdUser => is_md_user, as_md_user, to_md_user, to_md_user_mut;
    LvmPvUser => is_lvm_pv_user, as_lvm_pv_user, to_lvm_pv_user, to_lvm_pv_user_mut;
}

macro_rules! impl_user_holder {
    ($( $variant:ident ),*) => {
        $(
            impl UserHolder for $variant {
                fn sid(&self) -> Sid {
                    self.sid
                }

                fn is_active(&self) -> bool {
                    self.active
                }
            }
        )*
    };
}

impl_user_holder!(User, FilesystemUser, MdUser, LvmPvUser);

impl Holder {
    fn wrong_type(&self, expected: impl Into<String>) -> DevicegraphError {
        DevicegraphError::HolderHasWrongType {
            sid: self.sid(),
            expected: expected.into(),
            actual: self.kind().to_string(),
        }
    }

    pub fn as_user(&self) -> Option<&dyn UserHolder> {
        match self {
            Self::User(user) => Some(user as &dyn UserHolder),
            Self::FilesystemUser(user) => Some(user as &dyn UserHolder),
            Self::MdUser(user) => Some(user as &dyn UserHolder),
            Self::LvmPvUser(user) => Some(user as &dyn UserHolder),
            Self::Subdevice(_) => None,
        }
    }

    /// True for every user-like holder.
    pub fn is_user(&self) -> bool {
        self.as_user().is_some()
    }

    pub fn to_user(&self) -> Result<&dyn UserHolder, DevicegraphError> {
        self.as_user().ok_or_else(|| self.wrong_type("user"))
    }
}
