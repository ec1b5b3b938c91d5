//! Decoding of foreign creature records into [`Entity`] snapshots.
//!
//! Decoding is read-only. Every nested pointer is checked against the
//! process's mapped memory before it is followed, so a false positive from
//! the scanner surfaces as [`DecodeError::CorruptRecord`] rather than as
//! garbage in the model.

mod entity;
mod language;
mod strings;

use tracing::debug;

use crate::config::decode::{MAX_ENTITY_ID, MAX_SKILLS, NAME_WORDS};
use crate::error::{DecodeError, LayoutError};
use crate::layout::{CollectionLayout, Field, FieldSpec, MemoryLayout};
use crate::memory::{Address, ByteBuffer, ReadMemory};

pub use entity::*;
pub use language::*;
pub use strings::*;

#[cfg(test)]
pub(crate) use entity::fixtures;

/// Vector header (start, end, capacity) read from foreign memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorHeader {
    pub start: Address,
    pub end: Address,
    pub capacity: Address,
}

impl VectorHeader {
    pub fn read<R: ReadMemory + ?Sized>(
        reader: &R,
        address: Address,
        pointer_size: u8,
    ) -> Result<Self, DecodeError> {
        let ptr = usize::from(pointer_size);
        let bytes = reader.read_bytes(address, 3 * ptr)?;
        let buf = ByteBuffer::new(&bytes);
        Self::parse(&buf, 0, pointer_size)
            .ok_or_else(|| DecodeError::corrupt(address, "vector header truncated"))
    }

    fn parse(buf: &ByteBuffer<'_>, offset: usize, pointer_size: u8) -> Option<Self> {
        let ptr = usize::from(pointer_size);
        Some(Self {
            start: buf.ptr_at(offset, pointer_size)?,
            end: buf.ptr_at(offset + ptr, pointer_size)?,
            capacity: buf.ptr_at(offset + 2 * ptr, pointer_size)?,
        })
    }

    /// Element count, or `None` if the header is not an ascending triple
    /// spanning whole elements.
    pub fn count(&self, element_size: u64) -> Option<u64> {
        if self.start > self.end || self.end > self.capacity || element_size == 0 {
            return None;
        }
        let span = self.end - self.start;
        (span % element_size == 0).then_some(span / element_size)
    }
}

/// Read a vector of at most `max_count` pointers, checking each against
/// mapped memory.
pub(crate) fn read_pointer_vector<R: ReadMemory + ?Sized>(
    reader: &R,
    header_address: Address,
    pointer_size: u8,
    max_count: u64,
) -> Result<Vec<Address>, DecodeError> {
    let header = VectorHeader::read(reader, header_address, pointer_size)?;
    let count = header
        .count(u64::from(pointer_size))
        .ok_or_else(|| DecodeError::corrupt(header_address, "malformed vector header"))?;
    if count > max_count {
        return Err(DecodeError::corrupt(
            header_address,
            format!("{} elements exceeds the limit of {}", count, max_count),
        ));
    }
    if count == 0 {
        return Ok(Vec::new());
    }

    let ptr = usize::from(pointer_size);
    let bytes = reader.read_bytes(header.start, count as usize * ptr)?;
    let buf = ByteBuffer::new(&bytes);

    (0..count as usize)
        .map(|i| {
            let pointer = buf.ptr_at(i * ptr, pointer_size).unwrap_or(0);
            if pointer == 0 || !reader.is_mapped(pointer) {
                return Err(DecodeError::corrupt(
                    header.start + (i * ptr) as u64,
                    format!("element pointer 0x{:X} is not mapped", pointer),
                ));
            }
            Ok(pointer)
        })
        .collect()
}

/// Field offsets resolved once per decoder.
#[derive(Debug, Clone, Copy)]
struct CreatureFields {
    id: FieldSpec,
    first_name: u64,
    nickname: u64,
    last_name: u64,
    custom_profession: u64,
    profession: FieldSpec,
    sex: FieldSpec,
    happiness: FieldSpec,
    skills: u64,
    labors: u64,
    skill_id: FieldSpec,
    skill_rating: FieldSpec,
    skill_experience: FieldSpec,
}

impl CreatureFields {
    fn resolve(layout: &MemoryLayout) -> Result<Self, LayoutError> {
        Ok(Self {
            id: layout.field(Field::Id)?,
            first_name: layout.offset(Field::FirstName)?,
            nickname: layout.offset(Field::Nickname)?,
            last_name: layout.offset(Field::LastName)?,
            custom_profession: layout.offset(Field::CustomProfession)?,
            profession: layout.field(Field::Profession)?,
            sex: layout.field(Field::Sex)?,
            happiness: layout.field(Field::Happiness)?,
            skills: layout.offset(Field::SkillsVector)?,
            labors: layout.offset(Field::Labors)?,
            skill_id: layout.field(Field::SkillId)?,
            skill_rating: layout.field(Field::SkillRating)?,
            skill_experience: layout.field(Field::SkillExperience)?,
        })
    }

    /// Bytes to read per skill record.
    fn skill_record_size(&self) -> usize {
        [self.skill_id, self.skill_rating, self.skill_experience]
            .iter()
            .map(|spec| spec.offset as usize + spec.width.size())
            .max()
            .unwrap_or(0)
    }
}

fn field_value(buf: &ByteBuffer<'_>, spec: FieldSpec) -> Option<i64> {
    spec.width
        .decode(buf.slice(spec.offset as usize, spec.width.size())?)
}

pub struct EntityDecoder<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    layout: &'a MemoryLayout,
    fields: CreatureFields,
    strings: StringLayout,
    dictionary: Option<&'a Dictionary>,
}

impl<'a, R: ReadMemory + ?Sized> EntityDecoder<'a, R> {
    pub fn new(reader: &'a R, layout: &'a MemoryLayout) -> Result<Self, LayoutError> {
        Ok(Self {
            reader,
            layout,
            fields: CreatureFields::resolve(layout)?,
            strings: StringLayout::from_layout(layout)?,
            dictionary: None,
        })
    }

    /// Resolve last names through `dictionary`. Without one they are empty.
    pub fn with_dictionary(mut self, dictionary: &'a Dictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    /// Lazily decode every record behind the collection header at
    /// `collection_base`, in foreign-memory order.
    ///
    /// The header itself is validated up front; each record is decoded when
    /// the iterator reaches it. Collecting into `Result<Vec<_>, _>` aborts on
    /// the first corrupt record.
    pub fn decode_all(&self, collection_base: Address) -> Result<Entities<'_, 'a, R>, DecodeError> {
        let header = VectorHeader::read(self.reader, collection_base, self.layout.pointer_size)?;
        let element_size = self.layout.creatures.element_size(self.layout.pointer_size);
        let count = header
            .count(element_size)
            .ok_or_else(|| DecodeError::corrupt(collection_base, "malformed creature vector"))?;
        let max_count = self.layout.scan.creature_vector.max_count;
        if count > max_count {
            return Err(DecodeError::corrupt(
                collection_base,
                format!("{} creatures exceeds the limit of {}", count, max_count),
            ));
        }

        if count > 0 && !self.reader.is_mapped(header.start) {
            return Err(DecodeError::corrupt(
                collection_base,
                format!("creature vector start 0x{:X} is not mapped", header.start),
            ));
        }

        debug!(
            "Decoding {} creature record(s) from 0x{:X}",
            count, header.start
        );
        Ok(Entities {
            decoder: self,
            start: header.start,
            element_size,
            index: 0,
            count,
        })
    }

    /// Foreign address of the record behind vector element `element`.
    fn record_address(&self, element: Address) -> Result<Address, DecodeError> {
        match self.layout.creatures {
            CollectionLayout::Inline { .. } => Ok(element),
            CollectionLayout::Pointers { .. } => {
                let pointer = self.reader.read_ptr(element, self.layout.pointer_size)?;
                if pointer == 0 || !self.reader.is_mapped(pointer) {
                    return Err(DecodeError::corrupt(
                        element,
                        format!("creature pointer 0x{:X} is not mapped", pointer),
                    ));
                }
                Ok(pointer)
            }
        }
    }

    /// Decode the creature record at `address`.
    pub fn decode_record(&self, address: Address) -> Result<Entity, DecodeError> {
        let size = self.layout.creatures.record_size() as usize;
        let bytes = self.reader.read_bytes(address, size)?;
        let buf = ByteBuffer::new(&bytes);
        let fields = &self.fields;
        let read = |spec: FieldSpec, name: &str| {
            field_value(&buf, spec)
                .ok_or_else(|| DecodeError::corrupt(address, format!("{} outside record", name)))
        };

        let id = read(fields.id, "id")?;
        if !(0..=MAX_ENTITY_ID).contains(&id) {
            return Err(DecodeError::corrupt(
                address,
                format!("id {} out of range", id),
            ));
        }

        let string_at = |offset: u64| read_msvc_string(self.reader, address + offset, &self.strings);
        let first_name = string_at(fields.first_name)?;
        let nickname = string_at(fields.nickname)?;
        let custom_profession = string_at(fields.custom_profession)?;

        let last_name = match self.dictionary {
            Some(dictionary) => {
                let word_ids: Vec<i32> = (0..NAME_WORDS)
                    .map_while(|i| buf.i32_at(fields.last_name as usize + i * 4))
                    .collect();
                dictionary.last_name(&word_ids)
            }
            None => String::new(),
        };

        let labor_count = usize::from(self.layout.labor_count);
        let labors = self.read_labors(address, &buf, labor_count)?;

        Ok(Entity {
            id: EntityId(id as i32),
            address,
            first_name,
            nickname,
            last_name,
            custom_profession,
            profession: read(fields.profession, "profession")? as u8,
            sex: Sex::from_raw(read(fields.sex, "sex")?),
            happiness: read(fields.happiness, "happiness")? as i32,
            skills: self.read_skills(address, &buf)?,
            labors,
        })
    }

    fn read_labors(
        &self,
        address: Address,
        buf: &ByteBuffer<'_>,
        labor_count: usize,
    ) -> Result<Vec<bool>, DecodeError> {
        let offset = self.fields.labors;
        let bytes = match buf.slice(offset as usize, labor_count) {
            Some(bytes) => bytes.to_vec(),
            // Pointer records may be shorter than the labor block
            None => self.reader.read_bytes(address + offset, labor_count)?,
        };
        Ok(bytes.into_iter().map(|b| b != 0).collect())
    }

    fn read_skills(&self, address: Address, buf: &ByteBuffer<'_>) -> Result<Vec<Skill>, DecodeError> {
        let pointer_size = self.layout.pointer_size;
        let header = VectorHeader::parse(buf, self.fields.skills as usize, pointer_size)
            .ok_or_else(|| DecodeError::corrupt(address, "skills vector outside record"))?;
        let count = header
            .count(u64::from(pointer_size))
            .filter(|&count| count <= MAX_SKILLS)
            .ok_or_else(|| DecodeError::corrupt(address, "malformed skills vector"))?;
        if count == 0 {
            return Ok(Vec::new());
        }
        if !self.reader.is_mapped(header.start) {
            return Err(DecodeError::corrupt(
                address,
                format!("skills vector start 0x{:X} is not mapped", header.start),
            ));
        }

        let ptr = usize::from(pointer_size);
        let pointers = self.reader.read_bytes(header.start, count as usize * ptr)?;
        let pointers = ByteBuffer::new(&pointers);
        let record_size = self.fields.skill_record_size();

        let mut skills = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let skill_address = pointers.ptr_at(i * ptr, pointer_size).unwrap_or(0);
            if skill_address == 0 || !self.reader.is_mapped(skill_address) {
                return Err(DecodeError::corrupt(
                    address,
                    format!("skill pointer 0x{:X} is not mapped", skill_address),
                ));
            }

            let record = self.reader.read_bytes(skill_address, record_size)?;
            let record = ByteBuffer::new(&record);
            let value = |spec: FieldSpec| {
                field_value(&record, spec)
                    .ok_or_else(|| DecodeError::corrupt(skill_address, "skill record truncated"))
            };
            let id = u16::try_from(value(self.fields.skill_id)?).map_err(|_| {
                DecodeError::corrupt(skill_address, "negative skill id")
            })?;
            skills.push(Skill {
                id,
                rating: value(self.fields.skill_rating)? as i32,
                experience: value(self.fields.skill_experience)? as u32,
                address: skill_address,
            });
        }
        Ok(skills)
    }
}

/// Lazy sequence of decoded entities; see [`EntityDecoder::decode_all`].
pub struct Entities<'d, 'a, R: ReadMemory + ?Sized> {
    decoder: &'d EntityDecoder<'a, R>,
    start: Address,
    element_size: u64,
    index: u64,
    count: u64,
}

impl<R: ReadMemory + ?Sized> Entities<'_, '_, R> {
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<R: ReadMemory + ?Sized> Iterator for Entities<'_, '_, R> {
    type Item = Result<Entity, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let element = self.start + self.index * self.element_size;
        self.index += 1;

        Some(
            self.decoder
                .record_address(element)
                .and_then(|address| self.decoder.decode_record(address)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.count - self.index) as usize;
        (remaining, Some(remaining))
    }
}
