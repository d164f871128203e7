#![allow(dead_code)]

use std::io::Write;

use tempfile::NamedTempFile;

/// Single-stage cascade that fires on a bright-left / dark-right vertical edge.
pub const EDGE_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>20</height>
  <width>20</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 5.0000000000000000e-01</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 10 20 1.</_>
        <_>
          10 0 10 20 -1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

pub fn write_cascade() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp cascade");
    file.write_all(EDGE_CASCADE.as_bytes()).expect("write cascade");
    file
}

/// A YUV4MPEG2 (4:2:0, full range) stream. `luma(frame, x)` sets each column.
pub fn y4m_with<F>(width: u32, height: u32, rate: &str, frames: usize, luma: F) -> Vec<u8>
where
    F: Fn(usize, u32) -> u8,
{
    let mut out =
        format!("YUV4MPEG2 W{} H{} F{} Ip A1:1 C420jpeg\n", width, height, rate).into_bytes();
    let chroma = (width.div_ceil(2) * height.div_ceil(2)) as usize;
    for i in 0..frames {
        out.extend_from_slice(b"FRAME\n");
        for _ in 0..height {
            for x in 0..width {
                out.push(luma(i, x));
            }
        }
        out.extend(std::iter::repeat(128u8).take(chroma * 2));
    }
    out
}

/// Flat grey frames.
pub fn flat_y4m(width: u32, height: u32, rate: &str, frames: usize) -> Vec<u8> {
    y4m_with(width, height, rate, frames, |_, _| 90)
}

/// Odd frames carry a vertical edge down the middle; even frames are flat.
pub fn alternating_edge_y4m(width: u32, height: u32, rate: &str, frames: usize) -> Vec<u8> {
    y4m_with(width, height, rate, frames, move |i, x| {
        if i % 2 == 1 && x < width / 2 {
            255
        } else if i % 2 == 1 {
            0
        } else {
            128
        }
    })
}
