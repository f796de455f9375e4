//! Havok packfile container: header, section table, class names, fixup
//! resolution, and the virtual-fixup walk that builds the object store.
//!
//! The loader is IO-free: it operates on an in-memory byte slice. Decoding is
//! a single pass at construction; afterwards a [`HavokFile`] is an immutable
//! query object.

use byteorder::{ByteOrder, LittleEndian};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::error::Error;
use crate::model::{AnimationContainer, HavokObject, RigidBody, Shape, Skeleton};

/// Serialized null pointer: a slot that is not backed by any fixup.
pub(crate) const NULL_ADDRESS: u32 = 0xFFFF_FFFF;

const MAGIC_0: u32 = 0x57E0_E057;
const MAGIC_1: u32 = 0x10C0_C010;

const VERSION_STRING_550: &str = "Havok-5.5.0-r1";
const VERSION_STRING_2010: &str = "hk_2010.2.0-r1";

/// The two header personalities the decoder understands. Structural layouts
/// genuinely differ between them (field counts and orders, quaternion
/// component order), so typed decoders branch on this.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PackfileVersion {
    Havok550r1,
    Havok2010r1,
}

impl PackfileVersion {
    fn from_header_string(value: &str) -> Result<Self, Error> {
        match value {
            VERSION_STRING_550 => Ok(Self::Havok550r1),
            VERSION_STRING_2010 => Ok(Self::Havok2010r1),
            _ => Err(Error::UnsupportedVersion {
                value: value.to_string(),
            }),
        }
    }

    /// 5.5 serializes quaternions w-first; 2010 x-first.
    pub(crate) fn quaternion_w_first(self) -> bool {
        matches!(self, Self::Havok550r1)
    }

    /// 2010 packs (offset, count, capacity) hkArray headers where 5.5 spells
    /// out bare (offset, count) pairs.
    pub(crate) fn uses_hk_arrays(self) -> bool {
        matches!(self, Self::Havok2010r1)
    }
}

/// Bounds-checked little-endian cursor over the file bytes.
#[derive(Clone, Debug)]
pub(crate) struct Input<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> Input<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.cursor
    }

    pub(crate) fn seek(&mut self, offset: usize) -> Result<(), Error> {
        if offset > self.bytes.len() {
            return Err(Error::UnexpectedEof { offset });
        }
        self.cursor = offset;
        Ok(())
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.seek(self.cursor + n)
    }

    pub(crate) fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self.cursor + n;
        if end > self.bytes.len() {
            return Err(Error::UnexpectedEof {
                offset: self.cursor,
            });
        }
        let slice = &self.bytes[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_bytes(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub(crate) fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(LittleEndian::read_i16(self.read_bytes(2)?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(LittleEndian::read_f32(self.read_bytes(4)?))
    }

    pub(crate) fn read_vec4(&mut self) -> Result<glam::Vec4, Error> {
        Ok(glam::Vec4::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub(crate) fn read_quat(&mut self, w_first: bool) -> Result<glam::Quat, Error> {
        let a = self.read_f32()?;
        let b = self.read_f32()?;
        let c = self.read_f32()?;
        let d = self.read_f32()?;
        Ok(if w_first {
            glam::Quat::from_xyzw(b, c, d, a)
        } else {
            glam::Quat::from_xyzw(a, b, c, d)
        })
    }

    /// Reads the null-terminated string at `offset` without moving the cursor.
    pub(crate) fn read_cstr_at(&self, offset: usize) -> Result<String, Error> {
        let tail = self.bytes.get(offset..).ok_or(Error::UnexpectedEof { offset })?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::InvalidString {
                offset,
                message: "missing terminator".to_string(),
            })?;
        std::str::from_utf8(&tail[..end])
            .map(str::to_string)
            .map_err(|e| Error::InvalidString {
                offset,
                message: e.to_string(),
            })
    }

    /// Reads a fixed-width field holding a shorter null-terminated string.
    fn read_padded_str(&mut self, width: usize) -> Result<String, Error> {
        let offset = self.cursor;
        let raw = self.read_bytes(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
        std::str::from_utf8(&raw[..end])
            .map(str::to_string)
            .map_err(|e| Error::InvalidString {
                offset,
                message: e.to_string(),
            })
    }
}

#[derive(Clone, Debug)]
pub struct Section {
    pub name: String,
    pub absolute_data_start: u32,
    pub local_fixups_offset: u32,
    pub global_fixups_offset: u32,
    pub virtual_fixups_offset: u32,
    pub exports_offset: u32,
    pub imports_offset: u32,
    pub end_offset: u32,
}

/// One resolvable pointer slot. `target` is relative to `section`'s data
/// start; local fixups record the contents section here so lookup is uniform.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Fixup {
    pub(crate) target: u32,
    pub(crate) section: u32,
}

#[derive(Copy, Clone, Debug)]
struct VirtualFixup {
    address: u32,
    section: u32,
    name_address: u32,
}

#[derive(Clone, Debug)]
pub(crate) struct Header {
    pub(crate) num_sections: u32,
    pub(crate) contents_section: u32,
    pub(crate) class_name_section: u32,
    pub(crate) version: PackfileVersion,
}

pub(crate) fn read_header(input: &mut Input<'_>) -> Result<Header, Error> {
    let magic0 = input.read_u32()?;
    let magic1 = input.read_u32()?;
    if magic0 != MAGIC_0 || magic1 != MAGIC_1 {
        return Err(Error::BadMagic {
            found0: magic0,
            found1: magic1,
        });
    }
    let _user_tag = input.read_u32()?;
    let _file_version = input.read_u32()?;
    input.skip(4)?;
    let num_sections = input.read_u32()?;
    let contents_section = input.read_u32()?;
    let _contents_offset = input.read_u32()?;
    let class_name_section = input.read_u32()?;
    let _class_name_offset = input.read_u32()?;
    let version_string = input.read_padded_str(15)?;
    input.skip(1)?;
    let _flags = input.read_u32()?;
    input.skip(4)?;

    Ok(Header {
        num_sections,
        contents_section,
        class_name_section,
        version: PackfileVersion::from_header_string(&version_string)?,
    })
}

pub(crate) fn read_sections(input: &mut Input<'_>, count: u32) -> Result<Vec<Section>, Error> {
    let mut sections = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = input.read_padded_str(19)?;
        input.skip(1)?;
        sections.push(Section {
            name,
            absolute_data_start: input.read_u32()?,
            local_fixups_offset: input.read_u32()?,
            global_fixups_offset: input.read_u32()?,
            virtual_fixups_offset: input.read_u32()?,
            exports_offset: input.read_u32()?,
            imports_offset: input.read_u32()?,
            end_offset: input.read_u32()?,
        });
    }
    Ok(sections)
}

fn section<'s>(sections: &'s [Section], index: u32) -> Result<&'s Section, Error> {
    sections
        .get(index as usize)
        .ok_or(Error::SectionOutOfRange {
            index,
            count: sections.len(),
        })
}

/// Scans the class-name section into a map from the string's start offset
/// (relative to the section's data start, the offset virtual fixups carry) to
/// the class name. Entries are `(tag, cstring)` pairs terminated by a tag
/// whose low byte is 0xFF.
fn scan_class_names(
    input: &mut Input<'_>,
    section: &Section,
) -> Result<HashMap<u32, String>, Error> {
    let base = section.absolute_data_start as usize;
    let end = base + section.local_fixups_offset as usize;
    input.seek(base)?;

    let mut names = HashMap::new();
    while input.position() + 4 <= end {
        let tag = input.read_u32()?;
        if tag & 0xFF == 0xFF {
            break;
        }
        let offset = (input.position() - base) as u32;
        let name = input.read_cstr_at(input.position())?;
        input.skip(name.len() + 1)?;
        names.insert(offset, name);
    }
    Ok(names)
}

/// Merges the local and global fixup sub-tables of the contents section into
/// one map keyed by source offset relative to that section's data start.
pub(crate) fn collect_fixups(
    input: &mut Input<'_>,
    sections: &[Section],
    contents_index: u32,
) -> Result<BTreeMap<u32, Fixup>, Error> {
    let contents = section(sections, contents_index)?;
    let base = contents.absolute_data_start as usize;
    let mut fixups = BTreeMap::new();

    // Local fixups: (source, target) pairs, both within the contents section.
    input.seek(base + contents.local_fixups_offset as usize)?;
    let end = base + contents.global_fixups_offset as usize;
    while input.position() + 8 <= end {
        let address = input.read_u32()?;
        let target = input.read_u32()?;
        if address == NULL_ADDRESS || target == NULL_ADDRESS {
            break;
        }
        fixups.insert(
            address,
            Fixup {
                target,
                section: contents_index,
            },
        );
    }

    // Global fixups: (source, target section, target offset) triples.
    input.seek(base + contents.global_fixups_offset as usize)?;
    let end = base + contents.virtual_fixups_offset as usize;
    while input.position() + 12 <= end {
        let address = input.read_u32()?;
        if address == NULL_ADDRESS {
            break;
        }
        let target_section = input.read_u32()?;
        let target = input.read_u32()?;
        section(sections, target_section)?;
        fixups.insert(
            address,
            Fixup {
                target,
                section: target_section,
            },
        );
    }

    Ok(fixups)
}

fn collect_virtual_fixups(
    input: &mut Input<'_>,
    sections: &[Section],
    contents_index: u32,
) -> Result<Vec<VirtualFixup>, Error> {
    let contents = section(sections, contents_index)?;
    let base = contents.absolute_data_start as usize;
    input.seek(base + contents.virtual_fixups_offset as usize)?;
    let end = base + contents.exports_offset as usize;

    let mut virtuals = Vec::new();
    while input.position() + 12 <= end {
        let address = input.read_u32()?;
        if address == NULL_ADDRESS {
            break;
        }
        virtuals.push(VirtualFixup {
            address,
            section: input.read_u32()?,
            name_address: input.read_u32()?,
        });
    }
    Ok(virtuals)
}

/// Resolves the pointer slot at the cursor. Always consumes exactly 4 bytes.
///
/// A slot with no recorded fixup is not an error: padding and counts can look
/// like pointers, so an absent entry yields [`NULL_ADDRESS`]. A recorded fixup
/// whose target is exactly zero is a dangling pointer and fatal.
pub(crate) fn resolve_fixup(
    input: &mut Input<'_>,
    fixups: &BTreeMap<u32, Fixup>,
    sections: &[Section],
    section_index: u32,
) -> Result<u32, Error> {
    let base = section(sections, section_index)?.absolute_data_start;
    let key = input.position() as u32 - base;
    input.skip(4)?;
    match fixups.get(&key) {
        None => Ok(NULL_ADDRESS),
        Some(fixup) => {
            if fixup.target == 0 {
                return Err(Error::DanglingFixup { address: key });
            }
            Ok(fixup.target + section(sections, fixup.section)?.absolute_data_start)
        }
    }
}

/// Serialized dynamic array header: resolved data pointer (or null), element
/// count, and the capacity/flags word. Transient; consumed immediately to
/// drive a following array read.
#[derive(Copy, Clone, Debug)]
pub(crate) struct HkArray {
    pub(crate) offset: u32,
    pub(crate) count: u32,
}

impl HkArray {
    pub(crate) fn is_empty(&self) -> bool {
        self.offset == NULL_ADDRESS || self.count == 0
    }
}

/// Shared state for the typed decoders. Owns the cursor and the store being
/// populated; the fixup map, sections and class names are read-only by the
/// time this exists.
pub(crate) struct Decoder<'a> {
    pub(crate) input: Input<'a>,
    pub(crate) version: PackfileVersion,
    pub(crate) sections: Vec<Section>,
    /// Section whose data is being decoded right now; fixup source offsets
    /// are relative to this section's data start.
    pub(crate) current_section: u32,
    pub(crate) fixups: BTreeMap<u32, Fixup>,
    pub(crate) objects: BTreeMap<u32, HavokObject>,
}

impl<'a> Decoder<'a> {
    pub(crate) fn read_fixup(&mut self) -> Result<u32, Error> {
        resolve_fixup(
            &mut self.input,
            &self.fixups,
            &self.sections,
            self.current_section,
        )
    }

    /// Like [`read_fixup`](Self::read_fixup), but a null slot is an error.
    pub(crate) fn require_fixup(&mut self, context: &'static str) -> Result<u32, Error> {
        let offset = self.input.position();
        let address = self.read_fixup()?;
        if address == NULL_ADDRESS {
            return Err(Error::MissingFixup { context, offset });
        }
        Ok(address)
    }

    pub(crate) fn read_hk_array(&mut self) -> Result<HkArray, Error> {
        let offset = self.read_fixup()?;
        let count = self.input.read_u32()?;
        let _capacity_and_flags = self.input.read_u32()?;
        Ok(HkArray { offset, count })
    }

    /// 5.5-era bare (offset, count) pair.
    pub(crate) fn read_offset_count(&mut self) -> Result<HkArray, Error> {
        let offset = self.read_fixup()?;
        let count = self.input.read_u32()?;
        Ok(HkArray { offset, count })
    }

    /// Reads an array header in whichever form the file's personality uses.
    pub(crate) fn read_array_header(&mut self) -> Result<HkArray, Error> {
        if self.version.uses_hk_arrays() {
            self.read_hk_array()
        } else {
            self.read_offset_count()
        }
    }

    /// Reads the string a pointer slot at the cursor refers to, or `None` for
    /// a null slot.
    pub(crate) fn read_string(&mut self) -> Result<Option<String>, Error> {
        let address = self.read_fixup()?;
        if address == NULL_ADDRESS {
            return Ok(None);
        }
        Ok(Some(self.input.read_cstr_at(address as usize)?))
    }

    pub(crate) fn require_string(&mut self, context: &'static str) -> Result<String, Error> {
        let offset = self.input.position();
        self.read_string()?
            .ok_or(Error::MissingFixup { context, offset })
    }

    /// Reads `count` consecutive pointer slots, skipping `stride_pad` bytes of
    /// padding after each one.
    pub(crate) fn read_fixup_array(
        &mut self,
        count: usize,
        stride_pad: usize,
    ) -> Result<Vec<u32>, Error> {
        let mut addresses = Vec::with_capacity(count);
        for _ in 0..count {
            addresses.push(self.read_fixup()?);
            self.input.skip(stride_pad)?;
        }
        Ok(addresses)
    }

    /// Reads the pointer array behind an array header (null header = empty).
    pub(crate) fn read_address_array(&mut self, header: HkArray) -> Result<Vec<u32>, Error> {
        if header.is_empty() {
            return Ok(Vec::new());
        }
        self.input.seek(header.offset as usize)?;
        self.read_fixup_array(header.count as usize, 0)
    }

    fn decode_objects(
        &mut self,
        virtuals: &[VirtualFixup],
        class_names: &HashMap<u32, String>,
    ) -> Result<(), Error> {
        for entry in virtuals {
            let name = class_names
                .get(&entry.name_address)
                .ok_or(Error::ClassNameNotFound {
                    address: entry.name_address,
                })?;
            let address =
                section(&self.sections, entry.section)?.absolute_data_start + entry.address;
            self.current_section = entry.section;
            self.input.seek(address as usize)?;
            self.decode_object(name, address)?;
        }
        Ok(())
    }

    fn decode_object(&mut self, class_name: &str, address: u32) -> Result<(), Error> {
        match class_name {
            "hkaSkeleton" => {
                let skeleton = self.read_skeleton()?;
                self.objects.insert(address, HavokObject::Skeleton(skeleton));
            }
            "hkaSplineCompressedAnimation" => {
                let animation = self.read_spline_animation()?;
                self.objects.insert(address, HavokObject::Animation(animation));
            }
            "hkaInterleavedUncompressedAnimation" | "hkaDeltaCompressedAnimation" => {
                warn!(class = class_name, address, "animation format not implemented, skipping");
            }
            "hkaAnimationBinding" => {
                let binding = self.read_animation_binding()?;
                self.objects.insert(address, HavokObject::Binding(binding));
            }
            "hkaAnimationContainer" => {
                let container = self.read_animation_container()?;
                self.objects.insert(address, HavokObject::Container(container));
            }
            "hkxScene" => {
                self.read_scene()?;
            }
            "hkRootLevelContainer" => {
                self.read_root_level_container()?;
            }
            "RmdPhysicsSystem" => {
                self.read_physics_system()?;
            }
            "hkpRigidBody" => {
                let body = self.read_rigid_body()?;
                self.objects.insert(address, HavokObject::RigidBody(body));
            }
            _ => {
                if let Some(class) = crate::physics::ShapeClass::from_class_name(class_name) {
                    let shape = self.read_shape(class)?;
                    self.objects.insert(address, HavokObject::Shape(shape));
                } else {
                    warn!(class = class_name, address, "unknown Havok class, skipping");
                }
            }
        }
        Ok(())
    }

    /// Parses an `hkxScene` for validation only; nothing consumes it later.
    fn read_scene(&mut self) -> Result<(), Error> {
        self.input.skip(8)?;
        let modeller = self.read_string()?;
        let asset = self.read_string()?;
        debug!(?modeller, ?asset, "discarding hkxScene");
        Ok(())
    }

    /// Parses an `hkRootLevelContainer`'s named variants for validation only.
    fn read_root_level_container(&mut self) -> Result<(), Error> {
        let variants = self.read_array_header()?;
        if variants.is_empty() {
            return Ok(());
        }
        self.input.seek(variants.offset as usize)?;
        for _ in 0..variants.count {
            let name = self.read_string()?;
            let class_name = self.read_string()?;
            let _variant = self.read_fixup()?;
            debug!(?name, ?class_name, "discarding root level container variant");
        }
        Ok(())
    }
}

/// A fully decoded packfile: an address-keyed store of typed root objects.
///
/// All mutation happens in [`from_bytes`](Self::from_bytes); afterwards the
/// value is read-only and safe to query from multiple threads.
#[derive(Debug)]
pub struct HavokFile {
    version: PackfileVersion,
    sections: Vec<Section>,
    objects: BTreeMap<u32, HavokObject>,
}

impl HavokFile {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut input = Input::new(bytes);
        let header = read_header(&mut input)?;
        let sections = read_sections(&mut input, header.num_sections)?;
        let class_names =
            scan_class_names(&mut input, section(&sections, header.class_name_section)?)?;
        let fixups = collect_fixups(&mut input, &sections, header.contents_section)?;
        let virtuals = collect_virtual_fixups(&mut input, &sections, header.contents_section)?;

        let mut decoder = Decoder {
            input,
            version: header.version,
            sections,
            current_section: header.contents_section,
            fixups,
            objects: BTreeMap::new(),
        };
        decoder.decode_objects(&virtuals, &class_names)?;

        Ok(Self {
            version: header.version,
            sections: decoder.sections,
            objects: decoder.objects,
        })
    }

    pub fn version(&self) -> PackfileVersion {
        self.version
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// All decoded root objects, keyed by absolute file address.
    pub fn objects(&self) -> impl Iterator<Item = (u32, &HavokObject)> {
        self.objects.iter().map(|(&addr, obj)| (addr, obj))
    }

    fn object(&self, address: u32) -> Result<&HavokObject, Error> {
        self.objects
            .get(&address)
            .ok_or(Error::ObjectNotFound { address })
    }

    pub fn skeleton(&self, address: u32) -> Result<&Skeleton, Error> {
        match self.object(address)? {
            HavokObject::Skeleton(skeleton) => Ok(skeleton),
            other => Err(Error::ObjectKindMismatch {
                address,
                expected: "skeleton",
                found: other.kind(),
            }),
        }
    }

    pub fn animation(&self, address: u32) -> Result<&crate::model::Animation, Error> {
        match self.object(address)? {
            HavokObject::Animation(animation) => Ok(animation),
            other => Err(Error::ObjectKindMismatch {
                address,
                expected: "animation",
                found: other.kind(),
            }),
        }
    }

    pub fn binding(&self, address: u32) -> Result<&crate::model::AnimationBinding, Error> {
        match self.object(address)? {
            HavokObject::Binding(binding) => Ok(binding),
            other => Err(Error::ObjectKindMismatch {
                address,
                expected: "animation binding",
                found: other.kind(),
            }),
        }
    }

    pub fn rigid_body(&self, address: u32) -> Result<&RigidBody, Error> {
        match self.object(address)? {
            HavokObject::RigidBody(body) => Ok(body),
            other => Err(Error::ObjectKindMismatch {
                address,
                expected: "rigid body",
                found: other.kind(),
            }),
        }
    }

    pub fn shape(&self, address: u32) -> Result<&Shape, Error> {
        match self.object(address)? {
            HavokObject::Shape(shape) => Ok(shape),
            other => Err(Error::ObjectKindMismatch {
                address,
                expected: "shape",
                found: other.kind(),
            }),
        }
    }

    /// The file's animation container. Scene files carry exactly one; the
    /// first in address order is returned if a file carries several.
    pub fn animation_container(&self) -> Result<&AnimationContainer, Error> {
        self.objects
            .values()
            .find_map(|obj| match obj {
                HavokObject::Container(container) => Some(container),
                _ => None,
            })
            .ok_or(Error::NoAnimationContainer)
    }
}
