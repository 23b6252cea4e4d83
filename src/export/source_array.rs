//! C header holding the image for an emulator sketch.
//!
//! Only used pages get an array (`page_XXXX`, named by start address); the
//! status memory is always emitted in full as `status_mem`.

use crate::analysis::pages::is_page_used;
use crate::memory::{DataImage, StatusImage, PAGE_SIZE};
use crate::rom::RomCheck;

const PAGE_ROW: usize = 8;
const STATUS_ROW: usize = 16;

fn byte_row(bytes: &[u8]) -> String {
    let hex: Vec<String> = bytes.iter().map(|b| format!("0x{:02X}", b)).collect();
    format!("  {},", hex.join(","))
}

/// Name of the array emitted for the page starting at `start`.
pub fn page_array_name(start: usize) -> String {
    format!("page_{:04X}", start)
}

fn page_array(start: usize, chunk: &[u8], out: &mut Vec<String>) {
    out.push(format!(
        "// Page @ 0x{:04X} - 0x{:04X}",
        start,
        start + PAGE_SIZE - 1
    ));
    out.push(format!(
        "const uint8_t {}[{}] PROGMEM = {{",
        page_array_name(start),
        PAGE_SIZE
    ));
    out.extend(chunk.chunks(PAGE_ROW).map(byte_row));
    out.push("};".to_string());
    out.push(String::new());
}

fn status_array(status: &[u8], out: &mut Vec<String>) {
    out.push(format!("// Status Memory ({} Bytes)", status.len()));
    out.push(format!(
        "const uint8_t status_mem[{}] PROGMEM = {{",
        status.len()
    ));
    for (row, chunk) in status.chunks(STATUS_ROW).enumerate() {
        out.push(format!("  // 0x{:04X}", row * STATUS_ROW));
        out.push(byte_row(chunk));
    }
    out.push("};".to_string());
    out.push(String::new());
}

/// Render the header text.
pub fn generate_source_array(
    rom: Option<&RomCheck>,
    data: &DataImage,
    status: &StatusImage,
) -> String {
    let mut out = vec![
        "// AUTO-GENERATED by ds2506-reader.".to_string(),
        "// Image for the DS2506 emulator.".to_string(),
        "// WARNING: manual edits are overwritten by the next export.".to_string(),
        String::new(),
        "#pragma once".to_string(),
        "#include <Arduino.h>".to_string(),
        "#include <avr/pgmspace.h>".to_string(),
        String::new(),
    ];

    if let Some(rom) = rom {
        out.push(format!("// ROM Code: {}", rom.block));
        out.push(format!("// Family Code: 0x{:02X}", rom.family_code()));
        out.push(format!("// CRC Chip:    0x{:02X}", rom.stored_crc()));
        out.push(format!(
            "// CRC Calc:    0x{:02X} {}",
            rom.computed_crc,
            if rom.crc_ok { "(OK)" } else { "(MISMATCH)" }
        ));
        out.push(String::new());
    }

    for (index, chunk) in data.as_bytes().chunks_exact(PAGE_SIZE).enumerate() {
        if is_page_used(chunk) {
            page_array(index * PAGE_SIZE, chunk, &mut out);
        }
    }

    status_array(status.as_bytes(), &mut out);

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::IdentifierBlock;

    #[test]
    fn test_blank_image_emits_status_only() {
        let text = generate_source_array(None, &DataImage::blank(), &StatusImage::blank());
        assert!(text.starts_with("// AUTO-GENERATED"));
        assert!(text.contains("#pragma once\n#include <Arduino.h>\n#include <avr/pgmspace.h>\n"));
        assert!(!text.contains("page_"));
        assert!(!text.contains("// ROM Code"));
        assert!(text.contains("const uint8_t status_mem[256] PROGMEM = {"));
        assert_eq!(text.matches("  // 0x").count(), 16);
        assert!(text.contains("  // 0x00F0\n"));
    }

    #[test]
    fn test_used_page_array() {
        let mut bytes = vec![0xFF; DataImage::SIZE];
        bytes[0x40] = 0x01;
        bytes[0x5F] = 0xAB;
        let data = DataImage::new(bytes).unwrap();
        let text = generate_source_array(None, &data, &StatusImage::blank());

        assert!(text.contains("// Page @ 0x0040 - 0x005F\nconst uint8_t page_0040[32] PROGMEM = {\n"));
        assert!(text.contains("  0x01,0xFF,0xFF,0xFF,0xFF,0xFF,0xFF,0xFF,\n"));
        assert!(text.contains("  0xFF,0xFF,0xFF,0xFF,0xFF,0xFF,0xFF,0xAB,\n};"));
        assert_eq!(text.matches("PROGMEM").count(), 2);
    }

    #[test]
    fn test_rom_comment_block() {
        let good = IdentifierBlock::new([0x14, 0xA1, 0x5C, 0x33, 0x00, 0x00, 0x00, 0x10]).check();
        let text = generate_source_array(Some(&good), &DataImage::blank(), &StatusImage::blank());
        assert!(text.contains("// ROM Code: 14 A1 5C 33 00 00 00 10"));
        assert!(text.contains("// Family Code: 0x14"));
        assert!(text.contains("// CRC Calc:    0x10 (OK)"));

        let bad = IdentifierBlock::new([0x14, 0xA1, 0x5C, 0x33, 0x00, 0x00, 0x00, 0x11]).check();
        let text = generate_source_array(Some(&bad), &DataImage::blank(), &StatusImage::blank());
        assert!(text.contains("(MISMATCH)"));
    }
}
