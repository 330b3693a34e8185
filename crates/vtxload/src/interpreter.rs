//! Reference vertex loader, which walks the vertex format for every vertex it decodes.
use crate::{
    cp::{
        AttributeMode, VertexDescriptor,
        attributes::{
            ColorDescriptor, ColorFormat, ColorKind, CoordsFormat, NormalDescriptor, NormalFormat,
            NormalKind, TexCoordsDescriptor, VertexAttributeTable,
        },
    },
    loader::{
        AttributeFormat, ComponentType, Components, Ctx, DecoderFactory, LoaderUid,
        PortableVertexDeclaration, VertexLoader,
    },
    render::Topology,
};
use glam::{Vec2, Vec3};
use std::fmt::Write;
use zerocopy::IntoBytes;

const POSITION_ARRAY: usize = 0;
const NORMAL_ARRAY: usize = 1;
const DIFFUSE_ARRAY: usize = 2;
const SPECULAR_ARRAY: usize = 3;
const TEX_COORDS_ARRAY: usize = 4;

/// Big endian reader over a byte slice. Reads past the end produce zeros.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut buf = [0; N];
        let start = self.pos.min(self.data.len());
        let end = (self.pos + N).min(self.data.len());
        buf[..end - start].copy_from_slice(&self.data[start..end]);
        self.pos += N;

        buf
    }

    fn skip(&mut self, count: usize) {
        self.pos += count;
    }

    fn u8(&mut self) -> u8 {
        self.bytes::<1>()[0]
    }

    fn i8(&mut self) -> i8 {
        self.u8() as i8
    }

    fn u16(&mut self) -> u16 {
        u16::from_be_bytes(self.bytes())
    }

    fn i16(&mut self) -> i16 {
        i16::from_be_bytes(self.bytes())
    }

    fn u24(&mut self) -> u32 {
        let [a, b, c] = self.bytes();
        u32::from_be_bytes([0, a, b, c])
    }

    fn f32(&mut self) -> f32 {
        f32::from_bits(u32::from_be_bytes(self.bytes()))
    }
}

/// Reads a coordinate component, dequantizing integers by `scale`.
fn read_coord(reader: &mut Reader, format: CoordsFormat, scale: f32) -> f32 {
    match format {
        CoordsFormat::U8 => reader.u8() as f32 * scale,
        CoordsFormat::I8 => reader.i8() as f32 * scale,
        CoordsFormat::U16 => reader.u16() as f32 * scale,
        CoordsFormat::I16 => reader.i16() as f32 * scale,
        CoordsFormat::F32 => reader.f32(),
        _ => 0.0,
    }
}

fn read_normal_component(reader: &mut Reader, format: NormalFormat) -> f32 {
    match format {
        NormalFormat::I8 => reader.i8() as f32 / 64.0,
        NormalFormat::I16 => reader.i16() as f32 / 16384.0,
        NormalFormat::F32 => reader.f32(),
        _ => 0.0,
    }
}

fn read_color(reader: &mut Reader, descriptor: ColorDescriptor) -> [u8; 4] {
    let expand4 = |x: u32| (x * 17) as u8;
    let expand5 = |x: u32| ((x << 3) | (x >> 2)) as u8;
    let expand6 = |x: u32| ((x << 2) | (x >> 4)) as u8;

    let mut rgba = match descriptor.format() {
        ColorFormat::Rgb565 => {
            let data = reader.u16() as u32;
            [
                expand5((data >> 11) & 0x1F),
                expand6((data >> 5) & 0x3F),
                expand5(data & 0x1F),
                0xFF,
            ]
        }
        ColorFormat::Rgb888 => [reader.u8(), reader.u8(), reader.u8(), 0xFF],
        ColorFormat::Rgb888x => {
            let rgb = [reader.u8(), reader.u8(), reader.u8(), 0xFF];

            // throw away
            reader.skip(1);

            rgb
        }
        ColorFormat::Rgba4444 => {
            let data = reader.u16() as u32;
            [
                expand4((data >> 12) & 0xF),
                expand4((data >> 8) & 0xF),
                expand4((data >> 4) & 0xF),
                expand4(data & 0xF),
            ]
        }
        ColorFormat::Rgba6666 => {
            let data = reader.u24();
            [
                expand6((data >> 18) & 0x3F),
                expand6((data >> 12) & 0x3F),
                expand6((data >> 6) & 0x3F),
                expand6(data & 0x3F),
            ]
        }
        ColorFormat::Rgba8888 => [reader.u8(), reader.u8(), reader.u8(), reader.u8()],
        _ => [0; 4],
    };

    if descriptor.kind() == ColorKind::Rgb {
        rgba[3] = 0xFF;
    }

    rgba
}

/// Size of an attribute in the stream, given its mode and the size it has when direct.
fn stream_size(mode: AttributeMode, direct: u32) -> u32 {
    mode.size().unwrap_or(direct)
}

fn dequant_scale(format: CoordsFormat, shift: i32, byte_dequant: bool) -> f32 {
    let is_byte = matches!(format, CoordsFormat::U8 | CoordsFormat::I8);
    if is_byte && !byte_dequant {
        1.0
    } else {
        2.0f32.powi(-shift)
    }
}

/// Builds the output layout of a configuration, in the order position, normals, colors, texture
/// coordinates and position matrix index.
fn layout(
    vcd: &VertexDescriptor,
    vat: &VertexAttributeTable,
) -> (PortableVertexDeclaration, Components) {
    let mut declaration = PortableVertexDeclaration::default();
    let mut components = Components::default();

    let mut offset = 0;
    let mut next = |ty: ComponentType, count: u32, integer: bool| {
        let format = AttributeFormat {
            ty,
            components: count,
            offset,
            enabled: true,
            integer,
        };

        offset += format.size();
        format
    };

    declaration.position = next(ComponentType::F32, 3, false);
    components.position = vcd.low.position().present();

    if vcd.low.normal().present() {
        for i in 0..vat.a.normal().vectors() as usize {
            declaration.normals[i] = next(ComponentType::F32, 3, false);
            components.normals[i] = true;
        }
    }

    for (i, mode) in [vcd.low.diffuse(), vcd.low.specular()].into_iter().enumerate() {
        if mode.present() {
            declaration.colors[i] = next(ComponentType::U8, 4, false);
            components.colors[i] = true;
        }
    }

    for i in 0..8 {
        let present = vcd.tex_coord(i).present();
        let matrix = vcd.tex_coord_mat_index(i);
        if present || matrix {
            let count = if matrix { 3 } else { 2 };
            declaration.tex_coords[i] = next(ComponentType::F32, count, false);
            components.tex_coords[i] = present;
            components.tex_mat_index[i] = matrix;
        }
    }

    if vcd.low.pos_mat_index() {
        declaration.pos_mat_index = next(ComponentType::U8, 4, true);
        components.pos_mat_index = true;
    }

    declaration.stride = offset;
    (declaration, components)
}

/// A [`VertexLoader`] that interprets its configuration for every vertex.
pub struct InterpreterLoader {
    uid: LoaderUid,
    vertex_size: u32,
    declaration: PortableVertexDeclaration,
    components: Components,
}

impl InterpreterLoader {
    pub fn new(uid: LoaderUid) -> Self {
        let vcd = &uid.vcd;
        let vat = &uid.vat;

        let normal = vat.a.normal();
        let mut size = 0;

        size += vcd.low.pos_mat_index() as u32;
        size += (0..8).filter(|&i| vcd.tex_coord_mat_index(i)).count() as u32;
        size += stream_size(vcd.low.position(), vat.a.position().size());
        size += if Self::three_normal_indices(vcd, vat) {
            3 * stream_size(vcd.low.normal(), 0)
        } else {
            stream_size(vcd.low.normal(), normal.size())
        };
        size += stream_size(vcd.low.diffuse(), vat.a.diffuse().size());
        size += stream_size(vcd.low.specular(), vat.a.specular().size());
        for i in 0..8 {
            let tex = vat.tex(i).unwrap();
            size += stream_size(vcd.tex_coord(i), tex.size());
        }

        let (declaration, components) = layout(vcd, vat);
        let loader = Self {
            uid,
            vertex_size: size,
            declaration,
            components,
        };

        if loader.uses_reserved_format() {
            tracing::warn!(
                "vertex format uses a reserved attribute format: {}",
                loader.describe()
            );
        }

        loader
    }

    /// Whether normal, binormal and tangent are each fetched through their own index.
    fn three_normal_indices(vcd: &VertexDescriptor, vat: &VertexAttributeTable) -> bool {
        let mode = vcd.low.normal();
        vat.a.normal_index()
            && vat.a.normal().kind() == NormalKind::N9
            && matches!(mode, AttributeMode::Index8 | AttributeMode::Index16)
    }

    fn uses_reserved_format(&self) -> bool {
        let vcd = &self.uid.vcd;
        let vat = &self.uid.vat;

        (vcd.low.position().present() && vat.a.position().format().size().is_none())
            || (vcd.low.normal().present() && vat.a.normal().format().size().is_none())
            || (vcd.low.diffuse().present() && vat.a.diffuse().format().size().is_none())
            || (vcd.low.specular().present() && vat.a.specular().format().size().is_none())
            || (0..8).any(|i| {
                vcd.tex_coord(i).present() && vat.tex(i).unwrap().format().size().is_none()
            })
    }

    /// Reads an attribute either from the stream or, if indexed, from its array.
    fn fetch<T>(
        ctx: Ctx<'_>,
        src: &mut Reader,
        mode: AttributeMode,
        array: usize,
        read: impl FnOnce(&mut Reader) -> T,
    ) -> Option<T> {
        let index = match mode {
            AttributeMode::None => return None,
            AttributeMode::Direct => return Some(read(src)),
            AttributeMode::Index8 => src.u8() as usize,
            AttributeMode::Index16 => src.u16() as usize,
        };

        Some(read(&mut Self::array_reader(ctx, array, index)))
    }

    fn array_reader<'a>(ctx: Ctx<'a>, array: usize, index: usize) -> Reader<'a> {
        let array = ctx.arrays[array];
        let data = array
            .base
            .map(|base| base + index * array.stride as usize)
            .and_then(|offset| ctx.ram.get(offset..))
            .unwrap_or_default();

        Reader::new(data)
    }

    fn read_normals(&self, ctx: Ctx<'_>, src: &mut Reader) -> Option<[Vec3; 3]> {
        let vcd = &self.uid.vcd;
        let descriptor: NormalDescriptor = self.uid.vat.a.normal();
        let format = descriptor.format();
        let vectors = descriptor.vectors() as usize;

        let read_vector = |reader: &mut Reader| {
            let x = read_normal_component(reader, format);
            let y = read_normal_component(reader, format);
            let z = read_normal_component(reader, format);
            Vec3::new(x, y, z)
        };

        if Self::three_normal_indices(vcd, &self.uid.vat) {
            let vector_size = 3 * format.size().unwrap_or(0) as usize;
            let mut normals = [Vec3::ZERO; 3];
            for (i, normal) in normals.iter_mut().enumerate() {
                *normal = Self::fetch(ctx, src, vcd.low.normal(), NORMAL_ARRAY, |reader| {
                    reader.skip(i * vector_size);
                    read_vector(reader)
                })?;
            }

            return Some(normals);
        }

        Self::fetch(ctx, src, vcd.low.normal(), NORMAL_ARRAY, |reader| {
            let mut normals = [Vec3::ZERO; 3];
            for normal in normals.iter_mut().take(vectors) {
                *normal = read_vector(reader);
            }

            normals
        })
    }

    fn read_tex_coords(&self, ctx: Ctx<'_>, src: &mut Reader, index: usize) -> Option<Vec2> {
        let descriptor: TexCoordsDescriptor = self.uid.vat.tex(index).unwrap();
        let format = descriptor.format();
        let shift = descriptor.shift().value() as i32;
        let scale = dequant_scale(format, shift, self.uid.vat.a.byte_dequant());

        let mode = self.uid.vcd.tex_coord(index);
        Self::fetch(ctx, src, mode, TEX_COORDS_ARRAY + index, |reader| {
            let s = read_coord(reader, format, scale);
            let t = if descriptor.components() == 2 {
                read_coord(reader, format, scale)
            } else {
                0.0
            };

            Vec2::new(s, t)
        })
    }

    fn decode_vertex(&self, ctx: Ctx<'_>, src: &mut Reader, out: &mut [u8]) {
        let vcd = &self.uid.vcd;
        let vat = &self.uid.vat;
        let declaration = &self.declaration;

        let mut write = |format: &AttributeFormat, bytes: &[u8]| {
            out[format.offset as usize..][..bytes.len()].copy_from_slice(bytes);
        };

        let pos_mat_index = vcd.low.pos_mat_index().then(|| src.u8() & 0x3F);
        let mut tex_mat_index = [None; 8];
        for (i, index) in tex_mat_index.iter_mut().enumerate() {
            if vcd.tex_coord_mat_index(i) {
                *index = Some(src.u8() & 0x3F);
            }
        }

        let position = vat.a.position();
        let format = position.format();
        let shift = position.shift().value() as i32;
        let scale = dequant_scale(format, shift, vat.a.byte_dequant());
        let position = Self::fetch(ctx, src, vcd.low.position(), POSITION_ARRAY, |reader| {
            let x = read_coord(reader, format, scale);
            let y = read_coord(reader, format, scale);
            let z = if position.components() == 3 {
                read_coord(reader, format, scale)
            } else {
                0.0
            };

            Vec3::new(x, y, z)
        })
        .unwrap_or_default();
        write(&declaration.position, position.to_array().as_bytes());

        if let Some(normals) = self.read_normals(ctx, src) {
            for (format, normal) in declaration.normals.iter().zip(normals) {
                if format.enabled {
                    write(format, normal.to_array().as_bytes());
                }
            }
        }

        let colors = [
            (vcd.low.diffuse(), vat.a.diffuse(), DIFFUSE_ARRAY),
            (vcd.low.specular(), vat.a.specular(), SPECULAR_ARRAY),
        ];
        for (i, (mode, descriptor, array)) in colors.into_iter().enumerate() {
            if let Some(rgba) = Self::fetch(ctx, src, mode, array, |r| read_color(r, descriptor)) {
                write(&declaration.colors[i], rgba.as_bytes());
            }
        }

        for i in 0..8 {
            let coords = self.read_tex_coords(ctx, src, i).unwrap_or_default();
            let format = &declaration.tex_coords[i];
            if !format.enabled {
                continue;
            }

            match tex_mat_index[i] {
                Some(matrix) => write(format, coords.extend(matrix as f32).to_array().as_bytes()),
                None => write(format, coords.to_array().as_bytes()),
            }
        }

        if let Some(index) = pos_mat_index {
            write(&declaration.pos_mat_index, [index, 0, 0, 0].as_bytes());
        }
    }
}

impl VertexLoader for InterpreterLoader {
    fn vertex_size(&self) -> u32 {
        self.vertex_size
    }

    fn declaration(&self) -> &PortableVertexDeclaration {
        &self.declaration
    }

    fn components(&self) -> Components {
        self.components
    }

    fn run(&self, ctx: Ctx<'_>, _: Topology, count: u32, src: &[u8], dst: &mut [u8]) -> u32 {
        let stride = self.declaration.stride as usize;
        let size = self.vertex_size as usize;

        for i in 0..count as usize {
            let mut reader = Reader::new(&src[i * size..][..size]);
            self.decode_vertex(ctx, &mut reader, &mut dst[i * stride..][..stride]);
        }

        count
    }

    fn describe(&self) -> String {
        let vcd = &self.uid.vcd;
        let vat = &self.uid.vat;

        let mut out = format!("interpreter ({}b):", self.vertex_size);
        if vcd.low.pos_mat_index() {
            out.push_str(" pmtx");
        }

        if vcd.low.position().present() {
            let position = vat.a.position();
            _ = write!(
                out,
                " pos {:?} {:?}x{}",
                vcd.low.position(),
                position.format(),
                position.components()
            );
        }

        if vcd.low.normal().present() {
            let normal = vat.a.normal();
            _ = write!(
                out,
                " nrm {:?} {:?}x{}",
                vcd.low.normal(),
                normal.format(),
                3 * normal.vectors()
            );
        }

        for (name, mode, color) in [
            ("c0", vcd.low.diffuse(), vat.a.diffuse()),
            ("c1", vcd.low.specular(), vat.a.specular()),
        ] {
            if mode.present() {
                _ = write!(out, " {name} {mode:?} {:?}", color.format());
            }
        }

        for i in 0..8 {
            let mode = vcd.tex_coord(i);
            if let Some(tex) = vat.tex(i).filter(|_| mode.present()) {
                _ = write!(out, " t{i} {mode:?} {:?}x{}", tex.format(), tex.components());
            }
        }

        out
    }
}

/// Creates [`InterpreterLoader`]s.
pub struct InterpreterFactory;

impl DecoderFactory for InterpreterFactory {
    fn create(&self, uid: &LoaderUid) -> Box<dyn VertexLoader> {
        Box::new(InterpreterLoader::new(*uid))
    }
}
