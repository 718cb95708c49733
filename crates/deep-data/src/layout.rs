//! Sample record layout and semantic channel roles.
//!
//! A deep sample is a fixed-size byte record; [`ChannelLayout`] describes
//! it: per-channel storage type, byte size and byte offset, plus the
//! semantic roles (Z, Zback, alpha and its AR/AG/AB sub-channels) that the
//! compositing algorithms need. Roles are resolved once at init time by
//! name-matching convention and exposed as an enum-keyed lookup, so the
//! algorithms never do string comparisons per sample.
//!
//! Deep data comes from varied production pipelines with inconsistent
//! channel naming, so unresolved or ambiguous names are not an error:
//! the role is simply left unresolved and the algorithms that need it
//! no-op.

use deep_core::TypeDesc;
use smallvec::SmallVec;

/// Semantic role a channel can play during depth compositing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// Depth of the front of the sample's interval.
    Z,
    /// Depth of the back of the sample's interval.
    ZBack,
    /// Combined alpha (named `A` or `Alpha`).
    Alpha,
    /// Red alpha sub-channel.
    AR,
    /// Green alpha sub-channel.
    AG,
    /// Blue alpha sub-channel.
    AB,
}

const NROLES: usize = 6;

impl ChannelRole {
    #[inline]
    fn index(self) -> usize {
        match self {
            ChannelRole::Z => 0,
            ChannelRole::ZBack => 1,
            ChannelRole::Alpha => 2,
            ChannelRole::AR => 3,
            ChannelRole::AG => 4,
            ChannelRole::AB => 5,
        }
    }
}

/// Immutable-after-init description of the per-sample channel record.
#[derive(Debug, Clone, Default)]
pub struct ChannelLayout {
    names: Vec<String>,
    types: SmallVec<[TypeDesc; 8]>,
    sizes: SmallVec<[usize; 8]>,
    offsets: SmallVec<[usize; 8]>,
    samplesize: usize,
    roles: [Option<usize>; NROLES],
    myalpha: Vec<Option<usize>>,
}

/// True if `name` equals `role` or ends with `.role`, ignoring case.
fn name_matches(name: &str, role: &str) -> bool {
    if name.eq_ignore_ascii_case(role) {
        return true;
    }
    match name.rsplit_once('.') {
        Some((_, suffix)) => suffix.eq_ignore_ascii_case(role),
        None => false,
    }
}

impl ChannelLayout {
    /// Builds a layout for `nchannels` channels.
    ///
    /// `channeltypes` may supply fewer entries than `nchannels`, in which
    /// case the first supplied type (or float, if none) is replicated for
    /// all channels. Missing names are filled in as `channelN`.
    pub fn new(nchannels: usize, channeltypes: &[TypeDesc], channelnames: &[String]) -> Self {
        let types: SmallVec<[TypeDesc; 8]> = if channeltypes.len() == nchannels {
            channeltypes.iter().copied().collect()
        } else {
            let t = channeltypes.first().copied().unwrap_or(TypeDesc::FLOAT);
            std::iter::repeat(t).take(nchannels).collect()
        };

        let names: Vec<String> = (0..nchannels)
            .map(|c| {
                channelnames
                    .get(c)
                    .cloned()
                    .unwrap_or_else(|| format!("channel{}", c))
            })
            .collect();

        let mut sizes = SmallVec::new();
        let mut offsets = SmallVec::new();
        let mut offset = 0usize;
        for t in &types {
            sizes.push(t.size());
            offsets.push(offset);
            offset += t.size();
        }

        let mut layout = Self {
            names,
            types,
            sizes,
            offsets,
            samplesize: offset,
            roles: [None; NROLES],
            myalpha: Vec::new(),
        };
        layout.resolve_roles();
        layout
    }

    /// Single pass over channel names, first match wins.
    fn resolve_roles(&mut self) {
        let mut roles = [None; NROLES];
        for (c, name) in self.names.iter().enumerate() {
            let slots: &[(ChannelRole, bool)] = &[
                (ChannelRole::Z, name_matches(name, "Z")),
                (ChannelRole::ZBack, name_matches(name, "Zback")),
                (
                    ChannelRole::Alpha,
                    name_matches(name, "A") || name_matches(name, "Alpha"),
                ),
                (ChannelRole::AR, name_matches(name, "AR")),
                (ChannelRole::AG, name_matches(name, "AG")),
                (ChannelRole::AB, name_matches(name, "AB")),
            ];
            for &(role, hit) in slots {
                if hit && roles[role.index()].is_none() {
                    roles[role.index()] = Some(c);
                }
            }
        }
        // A missing Zback means samples are depth points, not intervals;
        // treat Zback as aliasing Z.
        if roles[ChannelRole::ZBack.index()].is_none() {
            roles[ChannelRole::ZBack.index()] = roles[ChannelRole::Z.index()];
        }
        self.roles = roles;

        // Second pass: associate every color channel with the alpha that
        // weights it. "diffuse.R" pairs with "diffuse.AR", plain "R" with
        // "AR"; anything without a named sibling falls back to the global
        // alpha, which may itself be unresolved.
        let z = self.roles[ChannelRole::Z.index()];
        let zback = self.roles[ChannelRole::ZBack.index()];
        let alpha = self.roles[ChannelRole::Alpha.index()];
        let is_alpha = |c: usize| {
            [ChannelRole::Alpha, ChannelRole::AR, ChannelRole::AG, ChannelRole::AB]
                .iter()
                .any(|r| self.roles[r.index()] == Some(c))
        };

        let myalpha: Vec<Option<usize>> = (0..self.names.len())
            .map(|c| {
                if z == Some(c) || zback == Some(c) {
                    None
                } else if is_alpha(c) {
                    Some(c)
                } else {
                    let name = &self.names[c];
                    let target = match name.rsplit_once('.') {
                        Some((prefix, suffix)) => format!("{}.A{}", prefix, suffix),
                        None => format!("A{}", name),
                    };
                    self.names
                        .iter()
                        .position(|n| n.eq_ignore_ascii_case(&target))
                        .or(alpha)
                }
            })
            .collect();
        self.myalpha = myalpha;
    }

    /// Number of channels in the sample record.
    #[inline]
    pub fn nchannels(&self) -> usize {
        self.names.len()
    }

    /// Name of channel `c`, or `""` for out of range.
    pub fn name(&self, c: usize) -> &str {
        self.names.get(c).map(|s| s.as_str()).unwrap_or("")
    }

    /// Storage type of channel `c`.
    pub fn channel_type(&self, c: usize) -> TypeDesc {
        self.types.get(c).copied().unwrap_or_default()
    }

    /// Size in bytes of one datum of channel `c`, 0 for out of range.
    pub fn channel_size(&self, c: usize) -> usize {
        self.sizes.get(c).copied().unwrap_or(0)
    }

    /// Byte offset of channel `c` within a sample record.
    pub fn channel_offset(&self, c: usize) -> usize {
        self.offsets.get(c).copied().unwrap_or(0)
    }

    /// Size in bytes of one full sample record.
    #[inline]
    pub fn samplesize(&self) -> usize {
        self.samplesize
    }

    /// All channel types, in channel order.
    pub fn channel_types(&self) -> &[TypeDesc] {
        &self.types
    }

    /// Resolved channel index for `role`, if any.
    #[inline]
    pub fn role(&self, role: ChannelRole) -> Option<usize> {
        self.roles[role.index()]
    }

    /// Index of the alpha channel that weights channel `c` during
    /// split/merge. `Some(c)` for alpha channels themselves, `None` for
    /// Z/Zback and for color channels with no alpha available.
    #[inline]
    pub fn my_alpha(&self, c: usize) -> Option<usize> {
        self.myalpha.get(c).copied().flatten()
    }

    /// AR channel, falling back to the combined alpha.
    #[inline]
    pub fn ar_or_alpha(&self) -> Option<usize> {
        self.role(ChannelRole::AR).or_else(|| self.role(ChannelRole::Alpha))
    }

    /// AG channel, falling back to the combined alpha.
    #[inline]
    pub fn ag_or_alpha(&self) -> Option<usize> {
        self.role(ChannelRole::AG).or_else(|| self.role(ChannelRole::Alpha))
    }

    /// AB channel, falling back to the combined alpha.
    #[inline]
    pub fn ab_or_alpha(&self) -> Option<usize> {
        self.role(ChannelRole::AB).or_else(|| self.role(ChannelRole::Alpha))
    }

    /// Whether `other` has exactly the same channel types, in order.
    pub fn same_channeltypes(&self, other: &ChannelLayout) -> bool {
        self.types == other.types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deep_core::TypeDesc;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_offsets_and_samplesize() {
        let layout = ChannelLayout::new(
            3,
            &[TypeDesc::HALF, TypeDesc::FLOAT, TypeDesc::UINT32],
            &names(&["A", "Z", "id"]),
        );
        assert_eq!(layout.channel_offset(0), 0);
        assert_eq!(layout.channel_offset(1), 2);
        assert_eq!(layout.channel_offset(2), 6);
        assert_eq!(layout.samplesize(), 10);
    }

    #[test]
    fn test_single_type_replicated() {
        let layout = ChannelLayout::new(4, &[TypeDesc::FLOAT], &names(&["R", "G", "B", "A"]));
        assert_eq!(layout.nchannels(), 4);
        assert_eq!(layout.samplesize(), 16);
        assert_eq!(layout.channel_type(3), TypeDesc::FLOAT);
    }

    #[test]
    fn test_role_resolution() {
        let layout = ChannelLayout::new(
            5,
            &[TypeDesc::FLOAT],
            &names(&["R", "G", "B", "A", "Z"]),
        );
        assert_eq!(layout.role(ChannelRole::Z), Some(4));
        assert_eq!(layout.role(ChannelRole::Alpha), Some(3));
        // No Zback: aliases Z.
        assert_eq!(layout.role(ChannelRole::ZBack), Some(4));
        assert_eq!(layout.role(ChannelRole::AR), None);
    }

    #[test]
    fn test_suffix_matching() {
        let layout = ChannelLayout::new(
            4,
            &[TypeDesc::FLOAT],
            &names(&["diffuse.R", "diffuse.A", "layer.Z", "layer.Zback"]),
        );
        assert_eq!(layout.role(ChannelRole::Z), Some(2));
        assert_eq!(layout.role(ChannelRole::ZBack), Some(3));
        assert_eq!(layout.role(ChannelRole::Alpha), Some(1));
    }

    #[test]
    fn test_my_alpha_siblings() {
        let layout = ChannelLayout::new(
            7,
            &[TypeDesc::FLOAT],
            &names(&["R", "G", "B", "AR", "AG", "AB", "Z"]),
        );
        assert_eq!(layout.my_alpha(0), Some(3)); // R -> AR
        assert_eq!(layout.my_alpha(1), Some(4)); // G -> AG
        assert_eq!(layout.my_alpha(2), Some(5)); // B -> AB
        assert_eq!(layout.my_alpha(3), Some(3)); // AR is its own alpha
        assert_eq!(layout.my_alpha(6), None); // Z has no alpha
    }

    #[test]
    fn test_my_alpha_prefixed_siblings() {
        let layout = ChannelLayout::new(
            3,
            &[TypeDesc::FLOAT],
            &names(&["diffuse.R", "diffuse.AR", "A"]),
        );
        assert_eq!(layout.my_alpha(0), Some(1)); // diffuse.R -> diffuse.AR
        assert_eq!(layout.my_alpha(1), Some(1));
    }

    #[test]
    fn test_my_alpha_global_fallback() {
        let layout = ChannelLayout::new(3, &[TypeDesc::FLOAT], &names(&["C", "A", "Z"]));
        // No "AC" sibling, so C falls back to the combined alpha.
        assert_eq!(layout.my_alpha(0), Some(1));
    }

    #[test]
    fn test_no_roles_resolved() {
        let layout = ChannelLayout::new(2, &[TypeDesc::FLOAT], &names(&["foo", "bar"]));
        assert_eq!(layout.role(ChannelRole::Z), None);
        assert_eq!(layout.role(ChannelRole::ZBack), None);
        assert_eq!(layout.my_alpha(0), None);
    }

    #[test]
    fn test_missing_names_filled() {
        let layout = ChannelLayout::new(3, &[TypeDesc::FLOAT], &names(&["Z"]));
        assert_eq!(layout.name(0), "Z");
        assert_eq!(layout.name(1), "channel1");
        assert_eq!(layout.name(2), "channel2");
    }
}
