//! Connector descriptors and the plug/socket compatibility check.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::registry::RegistrationPath;

/// Category of connectors carrying pixel data.
pub const DATA_CATEGORY: &str = "//colour/data";

/// Category of connectors carrying non-pixel control data.
pub const CONTROL_CATEGORY: &str = "//colour/control";

/// Layout and alpha capabilities a connector declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorCaps {
    pub planar: bool,
    pub interleaved: bool,
    pub swap: bool,
    pub swap_bytes: bool,
    pub revert: bool,
    pub premultiplied_alpha: bool,
    pub nonpremultiplied_alpha: bool,
    pub subpixel: bool,
}

impl ConnectorCaps {
    /// Interleaved or planar, either alpha mode.
    pub const FLEXIBLE: Self = Self {
        planar: true,
        interleaved: true,
        swap: false,
        swap_bytes: false,
        revert: false,
        premultiplied_alpha: true,
        nonpremultiplied_alpha: true,
        subpixel: false,
    };

    fn declares_alpha(&self) -> bool {
        self.premultiplied_alpha || self.nonpremultiplied_alpha
    }
}

/// What a plug accepts or a socket provides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDescriptor {
    /// Category registration, e.g. `//colour/data`.
    pub category: String,
    pub name: String,
    /// Inclusive channel range. `None` means undeclared.
    pub min_channels: Option<u32>,
    pub max_channels: Option<u32>,
    /// Highest channel index that may carry colour.
    pub max_colour_offset: Option<u32>,
    pub caps: ConnectorCaps,
    /// A stage cannot run while a mandatory plug is unconnected.
    pub mandatory: bool,
}

impl ConnectorDescriptor {
    /// Pixel data connector accepting 1 to 16 channels in any layout.
    pub fn data(name: &str) -> Self {
        Self {
            category: DATA_CATEGORY.to_owned(),
            name: name.to_owned(),
            min_channels: Some(1),
            max_channels: Some(16),
            max_colour_offset: Some(15),
            caps: ConnectorCaps::FLEXIBLE,
            mandatory: true,
        }
    }

    /// Single-channel control connector.
    pub fn control(name: &str) -> Self {
        Self {
            category: CONTROL_CATEGORY.to_owned(),
            name: name.to_owned(),
            min_channels: Some(1),
            max_channels: Some(1),
            max_colour_offset: None,
            caps: ConnectorCaps {
                interleaved: true,
                ..ConnectorCaps::default()
            },
            mandatory: false,
        }
    }

    pub fn with_channels(mut self, min: u32, max: u32) -> Self {
        self.min_channels = Some(min);
        self.max_channels = Some(max);
        self
    }

    pub fn with_caps(mut self, caps: ConnectorCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }

    /// Whether this connector's category is selected by `pattern`.
    pub fn is_category(&self, pattern: &str) -> bool {
        RegistrationPath::parse(pattern).matches(&RegistrationPath::parse(&self.category))
    }

    fn channel_range(&self) -> Result<(u32, u32), String> {
        match (self.min_channels, self.max_channels) {
            (Some(min), Some(max)) if min >= 1 && min <= max => Ok((min, max)),
            (min, max) => Err(format!(
                "connector \"{}\" declares no usable channel range ({min:?}..={max:?})",
                self.name
            )),
        }
    }

    /// Check whether `self`, used as a plug, may attach to `socket`.
    ///
    /// Undeclared or malformed channel ranges are rejected rather than
    /// treated as wildcards.
    pub fn check_compatible(&self, socket: &ConnectorDescriptor) -> Result<(), PipelineError> {
        let incompatible = |reason: String| Err(PipelineError::IncompatibleConnector(reason));

        let plug_cat = RegistrationPath::parse(&self.category);
        let socket_cat = RegistrationPath::parse(&socket.category);
        if !plug_cat.matches(&socket_cat) && !socket_cat.matches(&plug_cat) {
            return incompatible(format!(
                "category \"{}\" does not accept \"{}\"",
                self.category, socket.category
            ));
        }

        let (plug_min, plug_max) = match self.channel_range() {
            Ok(range) => range,
            Err(reason) => return incompatible(reason),
        };
        let (socket_min, socket_max) = match socket.channel_range() {
            Ok(range) => range,
            Err(reason) => return incompatible(reason),
        };
        if plug_min.max(socket_min) > plug_max.min(socket_max) {
            return incompatible(format!(
                "channel ranges {plug_min}..={plug_max} and {socket_min}..={socket_max} do not overlap"
            ));
        }

        let (a, b) = (&self.caps, &socket.caps);
        if !((a.planar && b.planar) || (a.interleaved && b.interleaved)) {
            return incompatible(format!(
                "\"{}\" and \"{}\" share no pixel layout",
                self.name, socket.name
            ));
        }

        if a.declares_alpha()
            && b.declares_alpha()
            && !((a.premultiplied_alpha && b.premultiplied_alpha)
                || (a.nonpremultiplied_alpha && b.nonpremultiplied_alpha))
        {
            return incompatible(format!(
                "\"{}\" and \"{}\" share no alpha mode",
                self.name, socket.name
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_data_connectors() {
        let plug = ConnectorDescriptor::data("in");
        let socket = ConnectorDescriptor::data("out").with_channels(3, 4);
        assert!(plug.check_compatible(&socket).is_ok());
        assert!(plug.is_category("//colour/data"));
        assert!(!plug.is_category("//colour/control"));
    }

    #[test]
    fn test_category_mismatch() {
        let plug = ConnectorDescriptor::data("in");
        let socket = ConnectorDescriptor::control("ctl");
        assert!(matches!(
            plug.check_compatible(&socket),
            Err(PipelineError::IncompatibleConnector(_))
        ));
    }

    #[test]
    fn test_disjoint_channel_ranges() {
        let plug = ConnectorDescriptor::data("in").with_channels(1, 2);
        let socket = ConnectorDescriptor::data("out").with_channels(3, 4);
        assert!(plug.check_compatible(&socket).is_err());
        let touching = ConnectorDescriptor::data("out").with_channels(2, 4);
        assert!(plug.check_compatible(&touching).is_ok());
    }

    #[test]
    fn test_undeclared_range_rejected() {
        let mut plug = ConnectorDescriptor::data("in");
        plug.max_channels = None;
        assert!(plug.check_compatible(&ConnectorDescriptor::data("out")).is_err());
        let inverted = ConnectorDescriptor::data("in").with_channels(4, 3);
        assert!(inverted.check_compatible(&ConnectorDescriptor::data("out")).is_err());
    }

    #[test]
    fn test_layout_and_alpha_must_overlap() {
        let planar_only = ConnectorCaps {
            planar: true,
            ..ConnectorCaps::default()
        };
        let interleaved_only = ConnectorCaps {
            interleaved: true,
            ..ConnectorCaps::default()
        };
        let plug = ConnectorDescriptor::data("in").with_caps(planar_only);
        let socket = ConnectorDescriptor::data("out").with_caps(interleaved_only);
        assert!(plug.check_compatible(&socket).is_err());

        let premul = ConnectorCaps {
            interleaved: true,
            premultiplied_alpha: true,
            ..ConnectorCaps::default()
        };
        let straight = ConnectorCaps {
            interleaved: true,
            nonpremultiplied_alpha: true,
            ..ConnectorCaps::default()
        };
        let plug = ConnectorDescriptor::data("in").with_caps(premul);
        assert!(plug
            .check_compatible(&ConnectorDescriptor::data("out").with_caps(straight))
            .is_err());
        // No alpha declared on one side: nothing to disagree on.
        assert!(plug
            .check_compatible(&ConnectorDescriptor::data("out").with_caps(interleaved_only))
            .is_ok());
    }
}
