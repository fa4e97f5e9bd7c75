//! System V AMD64 libc stubs.
//!
//! Arguments arrive in `rdi`, `rsi`, `rdx`; the result is left in `rax`. Only caller-saved
//! registers are clobbered and every branch is `rel8`, so the listings run from any base.
//! Offsets in the comments are relative to the start of each function.

use super::set::StubFragment;

/// `size_t strlen(const char *s)`
#[rustfmt::skip]
const STRLEN: &[u8] = &[
    0x31, 0xC0,                   // 00: xor  eax, eax
    0x80, 0x3C, 0x07, 0x00,       // 02: cmp  byte [rdi+rax], 0
    0x74, 0x05,                   // 06: je   0d
    0x48, 0xFF, 0xC0,             // 08: inc  rax
    0xEB, 0xF5,                   // 0b: jmp  02
    0xC3,                         // 0d: ret
];

/// `int strcmp(const char *a, const char *b)`
#[rustfmt::skip]
const STRCMP: &[u8] = &[
    0x0F, 0xB6, 0x07,             // 00: movzx eax, byte [rdi]
    0x0F, 0xB6, 0x0E,             // 03: movzx ecx, byte [rsi]
    0x39, 0xC8,                   // 06: cmp  eax, ecx
    0x75, 0x0C,                   // 08: jne  16
    0x85, 0xC0,                   // 0a: test eax, eax
    0x74, 0x08,                   // 0c: je   16
    0x48, 0xFF, 0xC7,             // 0e: inc  rdi
    0x48, 0xFF, 0xC6,             // 11: inc  rsi
    0xEB, 0xEA,                   // 14: jmp  00
    0x29, 0xC8,                   // 16: sub  eax, ecx
    0xC3,                         // 18: ret
];

/// `int strncmp(const char *a, const char *b, size_t n)`
#[rustfmt::skip]
const STRNCMP: &[u8] = &[
    0x48, 0x85, 0xD2,             // 00: test rdx, rdx
    0x74, 0x19,                   // 03: je   1e
    0x0F, 0xB6, 0x07,             // 05: movzx eax, byte [rdi]
    0x0F, 0xB6, 0x0E,             // 08: movzx ecx, byte [rsi]
    0x39, 0xC8,                   // 0b: cmp  eax, ecx
    0x75, 0x12,                   // 0d: jne  21
    0x85, 0xC0,                   // 0f: test eax, eax
    0x74, 0x0B,                   // 11: je   1e
    0x48, 0xFF, 0xC7,             // 13: inc  rdi
    0x48, 0xFF, 0xC6,             // 16: inc  rsi
    0x48, 0xFF, 0xCA,             // 19: dec  rdx
    0xEB, 0xE2,                   // 1c: jmp  00
    0x31, 0xC0,                   // 1e: xor  eax, eax
    0xC3,                         // 20: ret
    0x29, 0xC8,                   // 21: sub  eax, ecx
    0xC3,                         // 23: ret
];

/// `int strncasecmp(const char *a, const char *b, size_t n)`
///
/// Both bytes are folded to lower case (`'A'..='Z'` gets `0x20` or'ed in) before comparing.
#[rustfmt::skip]
const STRNCASECMP: &[u8] = &[
    0x48, 0x85, 0xD2,             // 00: test rdx, rdx
    0x74, 0x31,                   // 03: je   36
    0x0F, 0xB6, 0x07,             // 05: movzx eax, byte [rdi]
    0x0F, 0xB6, 0x0E,             // 08: movzx ecx, byte [rsi]
    0x3C, 0x41,                   // 0b: cmp  al, 'A'
    0x72, 0x07,                   // 0d: jb   16
    0x3C, 0x5A,                   // 0f: cmp  al, 'Z'
    0x77, 0x03,                   // 11: ja   16
    0x83, 0xC8, 0x20,             // 13: or   eax, 0x20
    0x80, 0xF9, 0x41,             // 16: cmp  cl, 'A'
    0x72, 0x08,                   // 19: jb   23
    0x80, 0xF9, 0x5A,             // 1b: cmp  cl, 'Z'
    0x77, 0x03,                   // 1e: ja   23
    0x83, 0xC9, 0x20,             // 20: or   ecx, 0x20
    0x39, 0xC8,                   // 23: cmp  eax, ecx
    0x75, 0x12,                   // 25: jne  39
    0x85, 0xC0,                   // 27: test eax, eax
    0x74, 0x0B,                   // 29: je   36
    0x48, 0xFF, 0xC7,             // 2b: inc  rdi
    0x48, 0xFF, 0xC6,             // 2e: inc  rsi
    0x48, 0xFF, 0xCA,             // 31: dec  rdx
    0xEB, 0xCA,                   // 34: jmp  00
    0x31, 0xC0,                   // 36: xor  eax, eax
    0xC3,                         // 38: ret
    0x29, 0xC8,                   // 39: sub  eax, ecx
    0xC3,                         // 3b: ret
];

/// `int memcmp(const void *a, const void *b, size_t n)`
#[rustfmt::skip]
const MEMCMP: &[u8] = &[
    0x48, 0x85, 0xD2,             // 00: test rdx, rdx
    0x74, 0x15,                   // 03: je   1a
    0x0F, 0xB6, 0x07,             // 05: movzx eax, byte [rdi]
    0x0F, 0xB6, 0x0E,             // 08: movzx ecx, byte [rsi]
    0x39, 0xC8,                   // 0b: cmp  eax, ecx
    0x75, 0x0E,                   // 0d: jne  1d
    0x48, 0xFF, 0xC7,             // 0f: inc  rdi
    0x48, 0xFF, 0xC6,             // 12: inc  rsi
    0x48, 0xFF, 0xCA,             // 15: dec  rdx
    0xEB, 0xE6,                   // 18: jmp  00
    0x31, 0xC0,                   // 1a: xor  eax, eax
    0xC3,                         // 1c: ret
    0x29, 0xC8,                   // 1d: sub  eax, ecx
    0xC3,                         // 1f: ret
];

/// `void *memset(void *dst, int c, size_t n)`
#[rustfmt::skip]
const MEMSET: &[u8] = &[
    0x48, 0x89, 0xF8,             // 00: mov  rax, rdi
    0x89, 0xF1,                   // 03: mov  ecx, esi
    0x48, 0x85, 0xD2,             // 05: test rdx, rdx
    0x74, 0x0A,                   // 08: je   14
    0x88, 0x0F,                   // 0a: mov  byte [rdi], cl
    0x48, 0xFF, 0xC7,             // 0c: inc  rdi
    0x48, 0xFF, 0xCA,             // 0f: dec  rdx
    0xEB, 0xF1,                   // 12: jmp  05
    0xC3,                         // 14: ret
];

/// `void *memcpy(void *dst, const void *src, size_t n)`
#[rustfmt::skip]
const MEMCPY: &[u8] = &[
    0x48, 0x89, 0xF8,             // 00: mov  rax, rdi
    0x48, 0x85, 0xD2,             // 03: test rdx, rdx
    0x74, 0x10,                   // 06: je   18
    0x0F, 0xB6, 0x0E,             // 08: movzx ecx, byte [rsi]
    0x88, 0x0F,                   // 0b: mov  byte [rdi], cl
    0x48, 0xFF, 0xC7,             // 0d: inc  rdi
    0x48, 0xFF, 0xC6,             // 10: inc  rsi
    0x48, 0xFF, 0xCA,             // 13: dec  rdx
    0xEB, 0xEB,                   // 16: jmp  03
    0xC3,                         // 18: ret
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
