use super::types::{NALUnit, NALUnitType, SPSInfo, SliceType};
use crate::utils::BitReader;
use crate::Result;

/// SEI payload type of a recovery point message.
const SEI_RECOVERY_POINT: u32 = 6;

/// Splits an Annex B byte stream into NAL units (start codes removed).
pub fn split_nal_units(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let mut end = match starts.get(n + 1) {
            Some(&next) => next - 3,
            None => data.len(),
        };
        // a 4 byte start code leaves its leading zero on the previous unit
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > start {
            units.push(&data[start..end]);
        }
    }
    units
}

/// Drops emulation prevention bytes (00 00 03 -> 00 00).
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// Stateless H.264 bitstream inspection.
#[derive(Debug, Default)]
pub struct H264Parser {
    sps: Option<SPSInfo>,
}

impl H264Parser {
    pub fn new() -> Self {
        Self { sps: None }
    }

    /// Walks an access unit, remembering the last SPS seen.
    pub fn scan(&mut self, data: &[u8]) -> Vec<NALUnitType> {
        let mut types = Vec::new();
        for unit in split_nal_units(data).into_iter().filter_map(NALUnit::new) {
            if unit.unit_type() == NALUnitType::SPS {
                if let Ok(sps) = self.parse_sps(unit.payload()) {
                    self.sps = Some(sps);
                }
            }
            types.push(unit.unit_type());
        }
        types
    }

    pub fn parse_sps(&self, payload: &[u8]) -> Result<SPSInfo> {
        let rbsp = remove_emulation_prevention(payload);
        let mut reader = BitReader::new(&rbsp);

        let profile_idc = reader.read_bits(8)? as u8;
        reader.skip_bits(8)?; // constraint flags and reserved bits
        let level_idc = reader.read_bits(8)? as u8;

        reader.read_golomb()?; // seq_parameter_set_id

        let mut chroma_format_idc = 1;
        if matches!(
            profile_idc,
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138
        ) {
            chroma_format_idc = reader.read_golomb()?;
            if chroma_format_idc == 3 {
                reader.read_bits(1)?; // separate_colour_plane_flag
            }
            reader.read_golomb()?; // bit_depth_luma_minus8
            reader.read_golomb()?; // bit_depth_chroma_minus8
            reader.read_bits(1)?; // qpprime_y_zero_transform_bypass_flag

            if reader.read_bit()? {
                let count = if chroma_format_idc != 3 { 8 } else { 12 };
                for i in 0..count {
                    if reader.read_bit()? {
                        let size = if i < 6 { 16 } else { 64 };
                        skip_scaling_list(&mut reader, size)?;
                    }
                }
            }
        }

        reader.read_golomb()?; // log2_max_frame_num_minus4
        let pic_order_cnt_type = reader.read_golomb()?;
        if pic_order_cnt_type == 0 {
            reader.read_golomb()?; // log2_max_pic_order_cnt_lsb_minus4
        } else if pic_order_cnt_type == 1 {
            reader.read_bits(1)?; // delta_pic_order_always_zero_flag
            reader.read_signed_golomb()?; // offset_for_non_ref_pic
            reader.read_signed_golomb()?; // offset_for_top_to_bottom_field
            let cycle = reader.read_golomb()?;
            for _ in 0..cycle {
                reader.read_signed_golomb()?;
            }
        }

        reader.read_golomb()?; // max_num_ref_frames
        reader.read_bits(1)?; // gaps_in_frame_num_value_allowed_flag

        let pic_width_in_mbs = reader.read_golomb()? + 1;
        let pic_height_in_map_units = reader.read_golomb()? + 1;
        let frame_mbs_only_flag = reader.read_bits(1)?;
        if frame_mbs_only_flag == 0 {
            reader.read_bits(1)?; // mb_adaptive_frame_field_flag
        }
        reader.read_bits(1)?; // direct_8x8_inference_flag

        let mut width = pic_width_in_mbs * 16;
        let mut height = (2 - frame_mbs_only_flag) * pic_height_in_map_units * 16;

        if reader.read_bit()? {
            let left = reader.read_golomb()?;
            let right = reader.read_golomb()?;
            let top = reader.read_golomb()?;
            let bottom = reader.read_golomb()?;
            let (unit_x, unit_y) = match chroma_format_idc {
                0 | 3 => (1, 2 - frame_mbs_only_flag),
                2 => (2, 2 - frame_mbs_only_flag),
                _ => (2, 2 * (2 - frame_mbs_only_flag)),
            };
            width = width.saturating_sub((left + right) * unit_x);
            height = height.saturating_sub((top + bottom) * unit_y);
        }

        Ok(SPSInfo {
            profile_idc,
            level_idc,
            width,
            height,
        })
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.sps.as_ref().map(|sps| (sps.width, sps.height))
    }
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) -> Result<()> {
    let mut last_scale = 8;
    let mut next_scale = 8;

    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = reader.read_signed_golomb()?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }

    Ok(())
}

/// Reads first_mb_in_slice and slice_type from a slice NAL.
pub fn slice_header(unit: &NALUnit) -> Result<(u32, SliceType)> {
    let head = &unit.payload()[..unit.payload().len().min(16)];
    let rbsp = remove_emulation_prevention(head);
    let mut reader = BitReader::new(&rbsp);
    let first_mb = reader.read_golomb()?;
    let slice_type = reader.read_golomb()?;
    Ok((first_mb, SliceType::from_code(slice_type)))
}

fn starts_with_recovery_point(unit: &NALUnit) -> bool {
    let mut payload_type = 0u32;
    for &byte in unit.payload() {
        payload_type += byte as u32;
        if byte != 0xFF {
            return payload_type == SEI_RECOVERY_POINT;
        }
    }
    false
}

/// True when an access unit can be decoded without earlier pictures: an
/// IDR slice, a recovery point SEI, or an intra slice that starts the
/// picture.
pub fn is_random_access(data: &[u8]) -> bool {
    for unit in split_nal_units(data).into_iter().filter_map(NALUnit::new) {
        match unit.unit_type() {
            NALUnitType::CodedSliceIDR => return true,
            NALUnitType::SEI if starts_with_recovery_point(&unit) => return true,
            NALUnitType::CodedSliceNonIDR => {
                return matches!(slice_header(&unit), Ok((0, t)) if t.is_intra());
            }
            _ => {}
        }
    }
    false
}
