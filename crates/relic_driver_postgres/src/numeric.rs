//! Binary wire codec for Postgres NUMERIC values.
//!
//! The engine carries decimals as strings to keep exact precision; the
//! binary protocol wants base-10000 digit groups. Layout: ndigits (i16),
//! weight (i16, position of the first group relative to the decimal
//! point), sign (u16), dscale (u16), then the groups, most significant
//! first.

use bytes::{BufMut, BytesMut};
use std::fmt::Write as _;

const SIGN_POSITIVE: u16 = 0x0000;
const SIGN_NEGATIVE: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;

pub fn encode(input: &str, out: &mut BytesMut) -> Result<(), String> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(SIGN_NAN);
        out.put_u16(0);
        return Ok(());
    }

    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    if unsigned.is_empty()
        || !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(format!("not a decimal literal: {}", input));
    }

    let dscale = frac_part.len() as u16;
    let int_digits = int_part.trim_start_matches('0');

    let mut groups: Vec<i16> = Vec::new();
    let mut weight: i16 = 0;

    if int_digits.is_empty() {
        weight = -1;
    } else {
        let pad = (4 - int_digits.len() % 4) % 4;
        let padded: String = "0".repeat(pad) + int_digits;
        for chunk in padded.as_bytes().chunks(4) {
            let group: i16 = std::str::from_utf8(chunk)
                .map_err(|_| "invalid digit group".to_string())?
                .parse()
                .map_err(|_| "invalid digit group".to_string())?;
            groups.push(group);
        }
        weight = groups.len() as i16 - 1;
    }

    if !frac_part.is_empty() {
        let pad = (4 - frac_part.len() % 4) % 4;
        let padded: String = frac_part.to_string() + &"0".repeat(pad);
        for chunk in padded.as_bytes().chunks(4) {
            let group: i16 = std::str::from_utf8(chunk)
                .map_err(|_| "invalid digit group".to_string())?
                .parse()
                .map_err(|_| "invalid digit group".to_string())?;
            groups.push(group);
        }
    }

    while groups.last() == Some(&0) {
        groups.pop();
    }
    let leading_zero_groups = groups.iter().take_while(|g| **g == 0).count();
    if leading_zero_groups > 0 {
        groups.drain(..leading_zero_groups);
        weight -= leading_zero_groups as i16;
    }
    if groups.is_empty() {
        weight = 0;
    }

    let sign = if negative && !groups.is_empty() {
        SIGN_NEGATIVE
    } else {
        SIGN_POSITIVE
    };

    out.put_i16(groups.len() as i16);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_u16(dscale);
    for group in groups {
        out.put_i16(group);
    }
    Ok(())
}

pub fn decode(buf: &[u8]) -> Result<String, String> {
    if buf.len() < 8 {
        return Err("numeric payload too short".to_string());
    }
    let ndigits = i16::from_be_bytes([buf[0], buf[1]]) as usize;
    let weight = i16::from_be_bytes([buf[2], buf[3]]);
    let sign = u16::from_be_bytes([buf[4], buf[5]]);
    let dscale = u16::from_be_bytes([buf[6], buf[7]]) as usize;

    if sign == SIGN_NAN {
        return Ok("NaN".to_string());
    }
    if buf.len() < 8 + ndigits * 2 {
        return Err("numeric payload truncated".to_string());
    }

    let mut groups = Vec::with_capacity(ndigits);
    for i in 0..ndigits {
        let offset = 8 + i * 2;
        groups.push(i16::from_be_bytes([buf[offset], buf[offset + 1]]));
    }

    let mut rendered = String::new();
    if sign == SIGN_NEGATIVE {
        rendered.push('-');
    }

    if weight < 0 {
        rendered.push('0');
    } else {
        for i in 0..=(weight as usize) {
            let group = groups.get(i).copied().unwrap_or(0);
            if i == 0 {
                let _ = write!(rendered, "{}", group);
            } else {
                let _ = write!(rendered, "{:04}", group);
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::new();
        for _ in 0..(-1 - i32::from(weight)).max(0) {
            frac.push_str("0000");
        }
        let start = (i32::from(weight) + 1).max(0) as usize;
        for group in groups.iter().skip(start) {
            let _ = write!(frac, "{:04}", group);
        }
        while frac.len() < dscale {
            frac.push('0');
        }
        rendered.push('.');
        rendered.push_str(&frac[..dscale]);
    }

    Ok(rendered)
}
