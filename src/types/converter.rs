/// 型文字列コンバーター（再帰下降）
///
/// 解析不能な入力は `TypeDescriptor::Unknown` に縮退する（寛容モード）。
/// `try_convert` は縮退の理由をエラーとして返す（厳格モード）。
/// 構造体メンバーの失敗は変換全体の失敗になる

use super::TypeDescriptor;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// 名前付き型の定義を引く外部インターフェース
///
/// 定義が無ければNone、構造体なら `{member1; member2; ...; }` 形式の文字列を返す
pub trait TypeDefinitionLookup {
    fn definition(&self, name: &str) -> Option<String>;
}

/// 定義を一切持たないルックアップ
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDefinitions;

impl TypeDefinitionLookup for NoDefinitions {
    fn definition(&self, _name: &str) -> Option<String> {
        None
    }
}

impl TypeDefinitionLookup for HashMap<String, String> {
    fn definition(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// 構造体定義の最大ネスト
pub const MAX_NESTING: usize = 16;

/// 1回の変換で生成できる型ノードの上限
pub const MAX_EXPANDED_NODES: usize = 4096;

/// 型文字列の解析エラー（厳格モードのみ）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeParseError {
    #[error("empty type string")]
    Empty,

    #[error("no base type in {0:?}")]
    NoBaseType(String),

    #[error("pointer without base type in {0:?}")]
    DanglingPointer(String),

    #[error("no definition for type {0:?}")]
    UnresolvedType(String),

    #[error("definition of {name:?} is not a struct body: {definition:?}")]
    NotAStruct { name: String, definition: String },

    #[error("more than one base type in {0:?}")]
    MultipleBaseTypes(String),

    #[error("type definitions nested deeper than {} at {:?}", MAX_NESTING, .0)]
    NestingTooDeep(String),

    #[error("type {0:?} refers to itself")]
    RecursiveType(String),

    #[error("type expands to more than {} nodes", MAX_EXPANDED_NODES)]
    TooLarge,
}

/// プリミティブ型テーブル（C名 → 正規化名）
static PRIMITIVES: &[(&str, &str)] = &[
    ("void", "void"),
    ("char", "i8"),
    ("short", "i16"),
    ("int", "i32"),
    ("long", "i64"),
    ("size_t", "i64"),
    ("gid_t", "i32"),
    ("uid_t", "i32"),
    ("pid_t", "i32"),
    ("int8_t", "i8"),
    ("int16_t", "i16"),
    ("int32_t", "i32"),
    ("int64_t", "i64"),
    ("uint8_t", "i8"),
    ("uint16_t", "i16"),
    ("uint32_t", "i32"),
    ("uint64_t", "i64"),
    ("float", "float"),
    ("double", "double"),
];

/// 型修飾キーワード（認識して捨てる）
static MODIFIERS: &[&str] = &["const", "struct", "unsigned", "signed"];

fn primitive(name: &str) -> Option<TypeDescriptor> {
    PRIMITIVES
        .iter()
        .find(|(c_name, _)| *c_name == name)
        .map(|(_, normalized)| TypeDescriptor::primitive(*normalized))
}

fn is_modifier(token: &str) -> bool {
    MODIFIERS.contains(&token)
}

/// 字句
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexeme<'a> {
    Word(&'a str),
    /// 連続する `*` の個数
    Stars(usize),
}

/// 空白で区切り、`<base><*...>` を基底名と `*` 列に分割
fn tokenize(input: &str) -> Vec<Lexeme<'_>> {
    let mut lexemes = Vec::new();
    for word in input.split_whitespace() {
        let base = word.trim_end_matches('*');
        let stars = word.len() - base.len();
        if !base.is_empty() {
            lexemes.push(Lexeme::Word(base));
        }
        if stars > 0 {
            lexemes.push(Lexeme::Stars(stars));
        }
    }
    lexemes
}

/// 構造体本体 `{m1; m2; }` からメンバー型文字列を取り出す
fn struct_members(definition: &str) -> Option<Vec<String>> {
    let open = definition.find('{')?;
    let close = definition.rfind('}')?;
    if close < open {
        return None;
    }

    let body = &definition[open + 1..close];
    let members = body
        .split(';')
        .map(normalize_member)
        .filter(|m| !m.is_empty())
        .collect();
    Some(members)
}

/// 前後の空白と `*` の直前の空白を取り除く（`char *` → `char*`）
fn normalize_member(member: &str) -> String {
    let mut out = String::with_capacity(member.len());
    let mut pending_space = false;

    for c in member.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && c != '*' {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// 展開中の名前付き型と生成済みノード数
#[derive(Debug, Default)]
struct Expansion {
    stack: Vec<String>,
    nodes: usize,
}

impl Expansion {
    fn count_node(&mut self) -> Result<(), TypeParseError> {
        self.nodes += 1;
        if self.nodes > MAX_EXPANDED_NODES {
            return Err(TypeParseError::TooLarge);
        }
        Ok(())
    }
}

/// 型文字列コンバーター
#[derive(Debug, Clone, Default)]
pub struct TypeConverter<L = NoDefinitions> {
    lookup: L,
}

impl TypeConverter<NoDefinitions> {
    pub fn new() -> Self {
        Self { lookup: NoDefinitions }
    }
}

impl<L: TypeDefinitionLookup> TypeConverter<L> {
    pub fn with_lookup(lookup: L) -> Self {
        Self { lookup }
    }

    /// 型文字列を変換（失敗しない。解析不能ならUnknown）
    pub fn convert(&self, type_string: &str) -> TypeDescriptor {
        match self.try_convert(type_string) {
            Ok(descriptor) => descriptor,
            Err(TypeParseError::Empty) => TypeDescriptor::Unknown,
            Err(e) => {
                warn!("Type {:?} degraded to void: {}", type_string, e);
                TypeDescriptor::Unknown
            }
        }
    }

    /// 型文字列を変換（縮退の理由をエラーで返す）
    pub fn try_convert(&self, type_string: &str) -> Result<TypeDescriptor, TypeParseError> {
        self.convert_at(type_string, &mut Expansion::default())
    }

    fn convert_at(&self, input: &str, expansion: &mut Expansion) -> Result<TypeDescriptor, TypeParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TypeParseError::Empty);
        }

        if let Some(descriptor) = primitive(input) {
            expansion.count_node()?;
            return Ok(descriptor);
        }

        let lexemes = tokenize(input);
        let mut elements: Vec<TypeDescriptor> = Vec::new();
        let mut pos = 0;

        // 各反復で必ず1つ以上の字句を消費する
        while pos < lexemes.len() {
            let mut lexeme = &lexemes[pos];
            pos += 1;

            // 修飾子は1つだけ読み飛ばし、次の字句を基底として扱う
            if let Lexeme::Word(word) = lexeme {
                if is_modifier(word) {
                    match lexemes.get(pos) {
                        Some(next) => {
                            lexeme = next;
                            pos += 1;
                        }
                        None => break,
                    }
                }
            }

            match lexeme {
                Lexeme::Stars(count) => {
                    let last = elements
                        .pop()
                        .ok_or_else(|| TypeParseError::DanglingPointer(input.to_string()))?;
                    elements.push(TypeDescriptor::pointer(last, *count));
                }
                Lexeme::Word(word) => {
                    let element = match primitive(word) {
                        Some(descriptor) => {
                            expansion.count_node()?;
                            descriptor
                        }
                        None => self.resolve_named(word, expansion)?,
                    };
                    elements.push(element);
                }
            }
        }

        match elements.len() {
            0 => Err(TypeParseError::NoBaseType(input.to_string())),
            1 => Ok(elements.remove(0)),
            _ => Err(TypeParseError::MultipleBaseTypes(input.to_string())),
        }
    }

    /// 名前付き型を定義から構造体に展開（メンバーの失敗はそのまま返す）
    fn resolve_named(&self, name: &str, expansion: &mut Expansion) -> Result<TypeDescriptor, TypeParseError> {
        if expansion.stack.iter().any(|open| open == name) {
            return Err(TypeParseError::RecursiveType(name.to_string()));
        }
        if expansion.stack.len() >= MAX_NESTING {
            return Err(TypeParseError::NestingTooDeep(name.to_string()));
        }
        expansion.count_node()?;

        let definition = self
            .lookup
            .definition(name)
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| TypeParseError::UnresolvedType(name.to_string()))?;

        let members = struct_members(&definition).ok_or_else(|| TypeParseError::NotAStruct {
            name: name.to_string(),
            definition: definition.clone(),
        })?;

        expansion.stack.push(name.to_string());
        let converted: Result<Vec<_>, _> = members
            .iter()
            .map(|member| self.convert_at(member, expansion))
            .collect();
        expansion.stack.pop();

        Ok(TypeDescriptor::Struct { members: converted? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(defs: &[(&str, &str)]) -> HashMap<String, String> {
        defs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_primitives() {
        let converter = TypeConverter::new();

        assert_eq!(converter.convert("int"), TypeDescriptor::primitive("i32"));
        assert_eq!(converter.convert("uint64_t"), TypeDescriptor::primitive("i64"));
        assert_eq!(converter.convert("pid_t"), TypeDescriptor::primitive("i32"));
        assert_eq!(converter.convert("double"), TypeDescriptor::primitive("double"));
        assert_eq!(converter.convert("  char  "), TypeDescriptor::primitive("i8"));
    }

    #[test]
    fn test_pointers() {
        let converter = TypeConverter::new();

        assert_eq!(
            converter.convert("char*"),
            TypeDescriptor::Pointer { inner: Box::new(TypeDescriptor::primitive("i8")), depth: 1 }
        );
        assert_eq!(converter.convert("char**").pointer_depth(), 2);
        assert_eq!(converter.convert("char **").to_string(), "i8**");
        assert_eq!(converter.convert("int * *").to_string(), "i32**");
    }

    #[test]
    fn test_modifiers_are_dropped() {
        let converter = TypeConverter::new();

        assert_eq!(converter.convert("unsigned int"), converter.convert("int"));
        assert_eq!(converter.convert("const char*").to_string(), "i8*");
        assert_eq!(converter.convert("signed char").to_string(), "i8");
    }

    #[test]
    fn test_single_modifier_consumption() {
        // 修飾子は基底ごとに1つしか消費しない
        let converter = TypeConverter::new();
        assert_eq!(converter.convert("const unsigned int"), TypeDescriptor::Unknown);
        assert_eq!(
            converter.try_convert("const unsigned int"),
            Err(TypeParseError::UnresolvedType("unsigned".to_string()))
        );
    }

    #[test]
    fn test_degenerate_inputs() {
        let converter = TypeConverter::new();

        assert_eq!(converter.convert(""), TypeDescriptor::Unknown);
        assert_eq!(converter.convert("   "), TypeDescriptor::Unknown);
        assert_eq!(converter.convert("const"), TypeDescriptor::Unknown);
        assert_eq!(converter.convert("const const const"), TypeDescriptor::Unknown);
        assert_eq!(converter.convert("*"), TypeDescriptor::Unknown);
        assert_eq!(converter.convert("long long"), TypeDescriptor::Unknown);

        assert_eq!(converter.try_convert(""), Err(TypeParseError::Empty));
        assert_eq!(
            converter.try_convert("const"),
            Err(TypeParseError::NoBaseType("const".to_string()))
        );
        assert_eq!(converter.try_convert("**"), Err(TypeParseError::DanglingPointer("**".to_string())));
        assert_eq!(
            converter.try_convert("long long"),
            Err(TypeParseError::MultipleBaseTypes("long long".to_string()))
        );
    }

    #[test]
    fn test_unresolved_named_type() {
        let converter = TypeConverter::new();
        assert_eq!(converter.convert("FILE*"), TypeDescriptor::Unknown);
        assert_eq!(
            converter.try_convert("FILE*"),
            Err(TypeParseError::UnresolvedType("FILE".to_string()))
        );
    }

    #[test]
    fn test_struct_definition() {
        let converter = TypeConverter::with_lookup(lookup(&[(
            "pair",
            "{ int; unsigned char *; char**; }",
        )]));

        let descriptor = converter.convert("struct pair");
        assert_eq!(
            descriptor,
            TypeDescriptor::Struct {
                members: vec![
                    TypeDescriptor::primitive("i32"),
                    TypeDescriptor::pointer(TypeDescriptor::primitive("i8"), 1),
                    TypeDescriptor::pointer(TypeDescriptor::primitive("i8"), 2),
                ],
            }
        );
        assert_eq!(descriptor.to_string(), "{i32,i8*,i8**}");
        assert_eq!(converter.convert("struct pair *").to_string(), "{i32,i8*,i8**}*");
        assert_eq!(converter.convert("pair**").pointer_depth(), 2);
    }

    #[test]
    fn test_nested_struct_definition() {
        let converter = TypeConverter::with_lookup(lookup(&[
            ("inner", "{int;float;}"),
            ("outer", "struct outer { struct inner; inner*; double; }"),
        ]));

        assert_eq!(converter.convert("outer").to_string(), "{{i32,float},{i32,float}*,double}");
    }

    #[test]
    fn test_non_struct_definition() {
        let converter = TypeConverter::with_lookup(lookup(&[("handle", "int")]));
        assert_eq!(converter.convert("handle"), TypeDescriptor::Unknown);
        assert!(matches!(
            converter.try_convert("handle"),
            Err(TypeParseError::NotAStruct { .. })
        ));
    }

    #[test]
    fn test_unknown_member_fails_whole_conversion() {
        let converter = TypeConverter::with_lookup(lookup(&[("s", "{int; FILE*;}")]));

        assert_eq!(converter.convert("s"), TypeDescriptor::Unknown);
        assert_eq!(converter.convert("s*"), TypeDescriptor::Unknown);
        assert_eq!(
            converter.try_convert("s"),
            Err(TypeParseError::UnresolvedType("FILE".to_string()))
        );
    }

    #[test]
    fn test_self_referential_definition_terminates() {
        let converter = TypeConverter::with_lookup(lookup(&[("node", "{int; node*;}")]));

        assert_eq!(converter.convert("node"), TypeDescriptor::Unknown);
        assert_eq!(
            converter.try_convert("node*"),
            Err(TypeParseError::RecursiveType("node".to_string()))
        );
    }

    #[test]
    fn test_repeated_self_reference_is_not_expanded() {
        let converter = TypeConverter::with_lookup(lookup(&[("n", "{n*; n*; n*; n*;}")]));

        assert_eq!(converter.convert("n"), TypeDescriptor::Unknown);
        assert_eq!(
            converter.try_convert("n"),
            Err(TypeParseError::RecursiveType("n".to_string()))
        );
    }

    #[test]
    fn test_mutual_recursion_is_detected() {
        let converter = TypeConverter::with_lookup(lookup(&[("a", "{int; b*;}"), ("b", "{a*;}")]));

        assert_eq!(converter.convert("a"), TypeDescriptor::Unknown);
        assert_eq!(
            converter.try_convert("a"),
            Err(TypeParseError::RecursiveType("a".to_string()))
        );
    }

    #[test]
    fn test_shared_definition_is_expanded_per_use() {
        // 同じ型を複数メンバーで使うのは再帰ではない
        let converter = TypeConverter::with_lookup(lookup(&[
            ("point", "{int; int;}"),
            ("line", "{point; point;}"),
        ]));

        assert_eq!(converter.convert("line").to_string(), "{{i32,i32},{i32,i32}}");
    }

    #[test]
    fn test_expansion_budget() {
        // t0..t14 はそれぞれ次の型を4回含む（4^15ノード）
        let mut defs: HashMap<String, String> = (0..15)
            .map(|i| {
                let next = format!("t{}", i + 1);
                (format!("t{}", i), format!("{{{0}; {0}; {0}; {0};}}", next))
            })
            .collect();
        defs.insert("t15".to_string(), "{int;}".to_string());
        let converter = TypeConverter::with_lookup(defs);

        assert_eq!(converter.try_convert("t0"), Err(TypeParseError::TooLarge));
        assert_eq!(converter.convert("t0"), TypeDescriptor::Unknown);
        assert!(matches!(converter.try_convert("t13"), Ok(TypeDescriptor::Struct { .. })));
    }

    #[test]
    fn test_nesting_limit() {
        let defs: HashMap<String, String> = (0..=MAX_NESTING)
            .map(|i| (format!("d{}", i), format!("{{d{}*;}}", i + 1)))
            .collect();
        let converter = TypeConverter::with_lookup(defs);

        assert_eq!(
            converter.try_convert("d0"),
            Err(TypeParseError::NestingTooDeep(format!("d{}", MAX_NESTING)))
        );
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("unsigned char**"),
            vec![Lexeme::Word("unsigned"), Lexeme::Word("char"), Lexeme::Stars(2)]
        );
        assert_eq!(tokenize("* int"), vec![Lexeme::Stars(1), Lexeme::Word("int")]);
    }

    #[test]
    fn test_normalize_member() {
        assert_eq!(normalize_member("  unsigned   char  * "), "unsigned char*");
        assert_eq!(normalize_member("int"), "int");
        assert_eq!(normalize_member(" "), "");
    }
}
