// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! NumPy `.npy` encoding of density maps.
//!
//! Layout: the magic string `\x93NUMPY`, a major and minor version byte, a
//! little-endian header length (`u16` for version 1, `u32` for 2 and 3), an
//! ASCII Python dict literal describing dtype, order and shape, then the raw
//! cell values. The header is space-padded and newline-terminated so the data
//! starts on a 64-byte boundary.

use crate::codec::ArrayBytes;
use crate::codec::ArraySlice;
use crate::error::Error;
use crate::geometry::Extent;
use crate::map::DensityMap;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const PREAMBLE_BYTES_V1: usize = 10;
const HEADER_ALIGN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F32,
    F64,
}

#[derive(Debug)]
struct ArrayHeader {
    dtype: Dtype,
    fortran_order: bool,
    height: usize,
    width: usize,
}

pub(crate) fn encode_npy(map: &DensityMap) -> Vec<u8> {
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        map.height(),
        map.width()
    );
    let unpadded = PREAMBLE_BYTES_V1 + header.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    header.extend(std::iter::repeat_n(' ', padding));
    header.push('\n');

    let mut bytes =
        ArrayBytes::with_capacity(PREAMBLE_BYTES_V1 + header.len() + map.as_slice().len() * 4);
    bytes.write(MAGIC);
    bytes.write_u8(1);
    bytes.write_u8(0);
    bytes.write_u16_le(header.len() as u16);
    bytes.write(header.as_bytes());
    debug_assert_eq!(bytes.len() % HEADER_ALIGN, 0);
    for &value in map.as_slice() {
        bytes.write_f32_le(value);
    }
    bytes.into_bytes()
}

pub(crate) fn decode_npy(bytes: &[u8]) -> Result<DensityMap, Error> {
    fn make_error(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
        move |_| Error::insufficient_data(tag)
    }

    let mut cursor = ArraySlice::new(bytes);
    let mut magic = [0u8; 6];
    cursor.read_exact(&mut magic).map_err(make_error("magic"))?;
    if &magic != MAGIC {
        return Err(Error::deserial("missing NumPy magic string"));
    }
    let major = cursor.read_u8().map_err(make_error("major_version"))?;
    let minor = cursor.read_u8().map_err(make_error("minor_version"))?;
    let header_len = match major {
        1 => cursor.read_u16_le().map_err(make_error("header_len"))? as usize,
        2 | 3 => cursor.read_u32_le().map_err(make_error("header_len"))? as usize,
        _ => {
            return Err(Error::deserial("unsupported NumPy format version")
                .with_context("version", format!("{major}.{minor}")));
        }
    };
    if header_len > bytes.len() {
        return Err(Error::insufficient_data("header"));
    }
    let mut header = vec![0u8; header_len];
    cursor.read_exact(&mut header).map_err(make_error("header"))?;
    let header = std::str::from_utf8(&header)
        .map_err(|err| Error::deserial("header is not valid text").set_source(err))?;
    let header = parse_header(header)?;

    let extent = Extent::new(header.height, header.width).map_err(|_| {
        Error::deserial("density map shape must be non-empty")
            .with_context("shape", format!("({}, {})", header.height, header.width))
    })?;
    let value_size = match header.dtype {
        Dtype::F32 => 4,
        Dtype::F64 => 8,
    };
    let expected = extent.cells().checked_mul(value_size);
    let preamble = if major == 1 { PREAMBLE_BYTES_V1 } else { PREAMBLE_BYTES_V1 + 2 };
    let remaining = bytes.len().saturating_sub(preamble + header_len);
    if expected.is_none_or(|expected| expected > remaining) {
        return Err(Error::insufficient_data("data"));
    }

    let mut values = Vec::with_capacity(extent.cells());
    for _ in 0..extent.cells() {
        let value = match header.dtype {
            Dtype::F32 => cursor.read_f32_le().map_err(make_error("data"))?,
            Dtype::F64 => cursor.read_f64_le().map_err(make_error("data"))? as f32,
        };
        values.push(value);
    }

    if header.fortran_order {
        let (height, width) = (header.height, header.width);
        let mut row_major = vec![0.0f32; values.len()];
        for col in 0..width {
            for row in 0..height {
                row_major[row * width + col] = values[col * height + row];
            }
        }
        values = row_major;
    }
    DensityMap::from_vec(header.height, header.width, values)
}

fn parse_header(header: &str) -> Result<ArrayHeader, Error> {
    let descr = quoted(value_of(header, "descr")?)
        .ok_or_else(|| Error::deserial("descr is not a string"))?;
    let dtype = match descr {
        "<f4" => Dtype::F32,
        "<f8" => Dtype::F64,
        _ => {
            return Err(Error::deserial("unsupported dtype").with_context("descr", descr));
        }
    };

    let order = value_of(header, "fortran_order")?;
    let fortran_order = if order.starts_with("True") {
        true
    } else if order.starts_with("False") {
        false
    } else {
        return Err(Error::deserial("fortran_order is not a boolean"));
    };

    let shape = value_of(header, "shape")?;
    let shape = shape
        .strip_prefix('(')
        .and_then(|rest| rest.split_once(')'))
        .map(|(dims, _)| dims)
        .ok_or_else(|| Error::deserial("shape is not a tuple"))?;
    let dims = shape
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.parse::<usize>().map_err(|err| {
                Error::deserial("shape dimension is not an integer")
                    .with_context("dim", dim)
                    .set_source(err)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let [height, width] = dims[..] else {
        return Err(Error::deserial("density map must be two-dimensional")
            .with_context("ndim", dims.len()));
    };

    Ok(ArrayHeader {
        dtype,
        fortran_order,
        height,
        width,
    })
}

// Returns the text following `'key':` in the header dict.
fn value_of<'a>(header: &'a str, key: &'static str) -> Result<&'a str, Error> {
    for quote in ['\'', '"'] {
        let pattern = format!("{quote}{key}{quote}");
        if let Some(start) = header.find(&pattern) {
            let rest = header[start + pattern.len()..].trim_start();
            if let Some(rest) = rest.strip_prefix(':') {
                return Ok(rest.trim_start());
            }
        }
    }
    Err(Error::deserial("header is missing a key").with_context("key", key))
}

fn quoted(value: &str) -> Option<&str> {
    let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &value[1..];
    rest.find(quote).map(|end| &rest[..end])
}
