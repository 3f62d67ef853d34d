//! Generic netlink control family queries.

use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::command::{Command, CommandCore, EncodeContext};
use crate::errors::{EncodingError, HalError};
use crate::event::Event;
use crate::hal::Hal;
use crate::netlink::{
    CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME, CTRL_ATTR_MCAST_GROUPS, CTRL_ATTR_MCAST_GRP_ID,
    CTRL_ATTR_MCAST_GRP_NAME, CTRL_CMD_GETFAMILY, GENL_ID_CTRL, Request,
};
use crate::registry::ENGINE_TARGET;

/// Family id and multicast groups reported by the control family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyInfo {
    id: u16,
    name: String,
    groups: Vec<(String, u32)>,
}

impl FamilyInfo {
    /// Numeric family id.
    #[must_use]
    pub const fn id(&self) -> u16 {
        self.id
    }

    /// Family name as reported.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the multicast group called `name`.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<u32> {
        self.groups
            .iter()
            .find(|(group, _)| group == name)
            .map(|(_, id)| *id)
    }

    /// Advertised groups as `(name, id)` pairs.
    #[must_use]
    pub fn groups(&self) -> &[(String, u32)] {
        &self.groups
    }

    fn decode(reply: &Event<'_>) -> Option<Self> {
        let id = reply.attribute(CTRL_ATTR_FAMILY_ID)?.as_u16()?;
        let name = reply
            .attribute(CTRL_ATTR_FAMILY_NAME)
            .and_then(|attr| attr.as_str())
            .unwrap_or_default()
            .to_owned();
        let groups = reply
            .attribute(CTRL_ATTR_MCAST_GROUPS)
            .map(|list| {
                list.nested()
                    .filter_map(|entry| {
                        let fields = entry.nested();
                        let group = fields.clone().lookup(CTRL_ATTR_MCAST_GRP_NAME)?.as_str()?;
                        let group_id = fields.lookup(CTRL_ATTR_MCAST_GRP_ID)?.as_u32()?;
                        Some((group.to_owned(), group_id))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(Self { id, name, groups })
    }
}

struct GetFamilyCommand {
    core: CommandCore,
    name: String,
    result: Mutex<Option<FamilyInfo>>,
}

impl GetFamilyCommand {
    fn new(name: &str) -> Self {
        Self {
            core: CommandCore::new(0, "get_family"),
            name: name.to_owned(),
            result: Mutex::new(None),
        }
    }

    fn take_result(&self) -> Option<FamilyInfo> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Command for GetFamilyCommand {
    fn core(&self) -> &CommandCore {
        &self.core
    }

    fn encode(&self, ctx: &EncodeContext) -> Result<Request, EncodingError> {
        let mut request = Request::new(GENL_ID_CTRL, CTRL_CMD_GETFAMILY, 0, ctx.limit());
        request.put_str(CTRL_ATTR_FAMILY_NAME, &self.name)?;
        Ok(request)
    }

    fn handle_response(&self, reply: &Event<'_>) {
        let decoded = FamilyInfo::decode(reply);
        if decoded.is_none() {
            debug!(target: ENGINE_TARGET, family = %self.name, "family reply without an id");
        }
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = decoded;
    }
}

/// Queries the control family for `name`.
///
/// # Errors
///
/// Returns [`HalError::UnknownFamily`] when the kernel does not know the
/// family or replies without an id, and transport errors otherwise.
pub fn resolve_family(hal: &Hal, name: &str) -> Result<FamilyInfo, HalError> {
    let command = GetFamilyCommand::new(name);
    match hal.request_response(&command) {
        Ok(()) => {}
        Err(HalError::Driver { errno, .. }) if errno == libc::ENOENT => {
            return Err(HalError::UnknownFamily {
                name: name.to_owned(),
            });
        }
        Err(error) => return Err(error),
    }
    let info = command.take_result().ok_or_else(|| HalError::UnknownFamily {
        name: name.to_owned(),
    })?;
    debug!(
        target: ENGINE_TARGET,
        family = name,
        id = info.id(),
        groups = info.groups().len(),
        "family resolved"
    );
    Ok(info)
}

/// Resolves the id of multicast `group` advertised by `family`.
///
/// # Errors
///
/// Returns [`HalError::UnknownGroup`] when the family does not advertise the
/// group, plus any [`resolve_family`] error.
pub fn resolve_group(hal: &Hal, family: &str, group: &str) -> Result<u32, HalError> {
    resolve_family(hal, family)?
        .group(group)
        .ok_or_else(|| HalError::UnknownGroup {
            family: family.to_owned(),
            group: group.to_owned(),
        })
}

impl Hal {
    /// Resolves the id of multicast `group` advertised by `family`.
    ///
    /// # Errors
    ///
    /// See [`resolve_group`].
    pub fn resolve_group(&self, family: &str, group: &str) -> Result<u32, HalError> {
        resolve_group(self, family, group)
    }
}
