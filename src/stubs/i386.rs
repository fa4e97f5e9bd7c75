//! System V i386 (cdecl) libc stubs.
//!
//! All arguments are on the stack: at entry `[esp]` holds the return address and
//! `[esp+4]`, `[esp+8]`, `[esp+12]` the first three arguments. The result is left in `eax`.
//! Callee-saved registers (`ebx`, `edi`, `esi`) are pushed before use, which shifts the
//! argument offsets by four bytes per push. Every branch is `rel8`.

use super::set::StubFragment;

/// `size_t strlen(const char *s)`
#[rustfmt::skip]
const STRLEN: &[u8] = &[
    0x8B, 0x54, 0x24, 0x04,       // 00: mov  edx, [esp+4]
    0x31, 0xC0,                   // 04: xor  eax, eax
    0x80, 0x3C, 0x02, 0x00,       // 06: cmp  byte [edx+eax], 0
    0x74, 0x03,                   // 0a: je   0f
    0x40,                         // 0c: inc  eax
    0xEB, 0xF7,                   // 0d: jmp  06
    0xC3,                         // 0f: ret
];

/// `int strcmp(const char *a, const char *b)`
#[rustfmt::skip]
const STRCMP: &[u8] = &[
    0x56,                         // 00: push esi
    0x8B, 0x54, 0x24, 0x08,       // 01: mov  edx, [esp+8]
    0x8B, 0x4C, 0x24, 0x0C,       // 05: mov  ecx, [esp+12]
    0x0F, 0xB6, 0x02,             // 09: movzx eax, byte [edx]
    0x0F, 0xB6, 0x31,             // 0c: movzx esi, byte [ecx]
    0x39, 0xF0,                   // 0f: cmp  eax, esi
    0x75, 0x08,                   // 11: jne  1b
    0x85, 0xC0,                   // 13: test eax, eax
    0x74, 0x04,                   // 15: je   1b
    0x42,                         // 17: inc  edx
    0x41,                         // 18: inc  ecx
    0xEB, 0xEE,                   // 19: jmp  09
    0x29, 0xF0,                   // 1b: sub  eax, esi
    0x5E,                         // 1d: pop  esi
    0xC3,                         // 1e: ret
];

/// `int strncmp(const char *a, const char *b, size_t n)`
#[rustfmt::skip]
const STRNCMP: &[u8] = &[
    0x56,                         // 00: push esi
    0x57,                         // 01: push edi
    0x8B, 0x54, 0x24, 0x0C,       // 02: mov  edx, [esp+12]
    0x8B, 0x4C, 0x24, 0x10,       // 06: mov  ecx, [esp+16]
    0x8B, 0x7C, 0x24, 0x14,       // 0a: mov  edi, [esp+20]
    0x85, 0xFF,                   // 0e: test edi, edi
    0x74, 0x13,                   // 10: je   25
    0x0F, 0xB6, 0x02,             // 12: movzx eax, byte [edx]
    0x0F, 0xB6, 0x31,             // 15: movzx esi, byte [ecx]
    0x39, 0xF0,                   // 18: cmp  eax, esi
    0x75, 0x0D,                   // 1a: jne  29
    0x85, 0xC0,                   // 1c: test eax, eax
    0x74, 0x05,                   // 1e: je   25
    0x42,                         // 20: inc  edx
    0x41,                         // 21: inc  ecx
    0x4F,                         // 22: dec  edi
    0xEB, 0xE9,                   // 23: jmp  0e
    0x31, 0xC0,                   // 25: xor  eax, eax
    0xEB, 0x02,                   // 27: jmp  2b
    0x29, 0xF0,                   // 29: sub  eax, esi
    0x5F,                         // 2b: pop  edi
    0x5E,                         // 2c: pop  esi
    0xC3,                         // 2d: ret
];

/// `int strncasecmp(const char *a, const char *b, size_t n)`
///
/// `ebx` holds the second byte because `esi`/`edi` have no 8-bit form in 32-bit mode.
#[rustfmt::skip]
const STRNCASECMP: &[u8] = &[
    0x53,                         // 00: push ebx
    0x57,                         // 01: push edi
    0x8B, 0x54, 0x24, 0x0C,       // 02: mov  edx, [esp+12]
    0x8B, 0x4C, 0x24, 0x10,       // 06: mov  ecx, [esp+16]
    0x8B, 0x7C, 0x24, 0x14,       // 0a: mov  edi, [esp+20]
    0x85, 0xFF,                   // 0e: test edi, edi
    0x74, 0x2B,                   // 10: je   3d
    0x0F, 0xB6, 0x02,             // 12: movzx eax, byte [edx]
    0x0F, 0xB6, 0x19,             // 15: movzx ebx, byte [ecx]
    0x3C, 0x41,                   // 18: cmp  al, 'A'
    0x72, 0x07,                   // 1a: jb   23
    0x3C, 0x5A,                   // 1c: cmp  al, 'Z'
    0x77, 0x03,                   // 1e: ja   23
    0x83, 0xC8, 0x20,             // 20: or   eax, 0x20
    0x80, 0xFB, 0x41,             // 23: cmp  bl, 'A'
    0x72, 0x08,                   // 26: jb   30
    0x80, 0xFB, 0x5A,             // 28: cmp  bl, 'Z'
    0x77, 0x03,                   // 2b: ja   30
    0x83, 0xCB, 0x20,             // 2d: or   ebx, 0x20
    0x39, 0xD8,                   // 30: cmp  eax, ebx
    0x75, 0x0D,                   // 32: jne  41
    0x85, 0xC0,                   // 34: test eax, eax
    0x74, 0x05,                   // 36: je   3d
    0x42,                         // 38: inc  edx
    0x41,                         // 39: inc  ecx
    0x4F,                         // 3a: dec  edi
    0xEB, 0xD1,                   // 3b: jmp  0e
    0x31, 0xC0,                   // 3d: xor  eax, eax
    0xEB, 0x02,                   // 3f: jmp  43
    0x29, 0xD8,                   // 41: sub  eax, ebx
    0x5F,                         // 43: pop  edi
    0x5B,                         // 44: pop  ebx
    0xC3,                         // 45: ret
];

/// `int memcmp(const void *a, const void *b, size_t n)`
#[rustfmt::skip]
const MEMCMP: &[u8] = &[
    0x56,                         // 00: push esi
    0x57,                         // 01: push edi
    0x8B, 0x54, 0x24, 0x0C,       // 02: mov  edx, [esp+12]
    0x8B, 0x4C, 0x24, 0x10,       // 06: mov  ecx, [esp+16]
    0x8B, 0x7C, 0x24, 0x14,       // 0a: mov  edi, [esp+20]
    0x85, 0xFF,                   // 0e: test edi, edi
    0x74, 0x0F,                   // 10: je   21
    0x0F, 0xB6, 0x02,             // 12: movzx eax, byte [edx]
    0x0F, 0xB6, 0x31,             // 15: movzx esi, byte [ecx]
    0x39, 0xF0,                   // 18: cmp  eax, esi
    0x75, 0x09,                   // 1a: jne  25
    0x42,                         // 1c: inc  edx
    0x41,                         // 1d: inc  ecx
    0x4F,                         // 1e: dec  edi
    0xEB, 0xED,                   // 1f: jmp  0e
    0x31, 0xC0,                   // 21: xor  eax, eax
    0xEB, 0x02,                   // 23: jmp  27
    0x29, 0xF0,                   // 25: sub  eax, esi
    0x5F,                         // 27: pop  edi
    0x5E,                         // 28: pop  esi
    0xC3,                         // 29: ret
];

/// `void *memset(void *dst, int c, size_t n)`
#[rustfmt::skip]
const MEMSET: &[u8] = &[
    0x57,                         // 00: push edi
    0x8B, 0x54, 0x24, 0x08,       // 01: mov  edx, [esp+8]
    0x8B, 0x4C, 0x24, 0x0C,       // 05: mov  ecx, [esp+12]
    0x8B, 0x7C, 0x24, 0x10,       // 09: mov  edi, [esp+16]
    0x85, 0xFF,                   // 0d: test edi, edi
    0x74, 0x06,                   // 0f: je   17
    0x88, 0x0A,                   // 11: mov  byte [edx], cl
    0x42,                         // 13: inc  edx
    0x4F,                         // 14: dec  edi
    0xEB, 0xF6,                   // 15: jmp  0d
    0x8B, 0x44, 0x24, 0x08,       // 17: mov  eax, [esp+8]
    0x5F,                         // 1b: pop  edi
    0xC3,                         // 1c: ret
];

/// `void *memcpy(void *dst, const void *src, size_t n)`
#[rustfmt::skip]
const MEMCPY: &[u8] = &[
    0x57,                         // 00: push edi
    0x8B, 0x54, 0x24, 0x08,       // 01: mov  edx, [esp+8]
    0x8B, 0x4C, 0x24, 0x0C,       // 05: mov  ecx, [esp+12]
    0x8B, 0x7C, 0x24, 0x10,       // 09: mov  edi, [esp+16]
    0x85, 0xFF,                   // 0d: test edi, edi
    0x74, 0x0A,                   // 0f: je   1b
    0x0F, 0xB6, 0x01,             // 11: movzx eax, byte [ecx]
    0x88, 0x02,                   // 14: mov  byte [edx], al
    0x42,                         // 16: inc  edx
    0x41,                         // 17: inc  ecx
    0x4F,                         // 18: dec  edi
    0xEB, 0xF2,                   // 19: jmp  0d
    0x8B, 0x44, 0x24, 0x08,       // 1b: mov  eax, [esp+8]
    0x5F,                         // 1f: pop  edi
    0xC3,                         // 20: ret
];

pub(super) const LIBC: &[StubFragment] = &[
    StubFragment { name: "strlen", code: STRLEN },
    StubFragment { name: "strcmp", code: STRCMP },
    StubFragment { name: "strncmp", code: STRNCMP },
    StubFragment { name: "strncasecmp", code: STRNCASECMP },
    StubFragment { name: "memcmp", code: MEMCMP },
    StubFragment { name: "memset", code: MEMSET },
    StubFragment { name: "memcpy", code: MEMCPY },
];
