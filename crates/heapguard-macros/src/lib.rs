use proc_macro::TokenStream;
use quote::quote;
use syn::parse::Parser;
use syn::{parse_macro_input, ItemFn, LitInt, LitStr};

#[derive(Clone, Copy)]
enum Format {
    Text,
    Table,
    Json,
    JsonPretty,
}

impl Format {
    fn to_tokens(self) -> proc_macro2::TokenStream {
        match self {
            Format::Text => quote!(heapguard::Format::Text),
            Format::Table => quote!(heapguard::Format::Table),
            Format::Json => quote!(heapguard::Format::Json),
            Format::JsonPretty => quote!(heapguard::Format::JsonPretty),
        }
    }
}

#[derive(Clone, Copy)]
enum Basis {
    AllTime,
    Live,
}

impl Basis {
    fn to_tokens(self) -> proc_macro2::TokenStream {
        match self {
            Basis::AllTime => quote!(heapguard::Basis::AllTime),
            Basis::Live => quote!(heapguard::Basis::Live),
        }
    }
}

/// Reports the thread-local heap when the annotated function returns.
///
/// The function body runs with a [`HeapGuard`](../heapguard/struct.HeapGuard.html)
/// alive. When it is dropped, heap statistics, leaked blocks and heavy
/// hitters are printed to stderr.
///
/// # Parameters
///
/// * `format` - `"text"`, `"table"`, `"json"` or `"json-pretty"`. Default: `HEAPGUARD_FORMAT` or `"text"`
/// * `top` - Report only the N heaviest call sites (0 = all). Wins over `share`
/// * `share` - Report call sites holding at least this percentage of bytes. Default: `20`
/// * `basis` - Rank by `"all-time"` or `"live"` bytes. Default: `"all-time"`
///
/// # Examples
///
/// ```rust,no_run
/// #[heapguard::main]
/// fn main() {
///     let leaked = heapguard::malloc!(64);
/// }
/// ```
///
/// ```rust,no_run
/// #[heapguard::main(format = "table", top = 5, basis = "live")]
/// fn main() {
///     // Your code here
/// }
/// ```
///
/// # See Also
///
/// * [`GuardBuilder`](../heapguard/struct.GuardBuilder.html) - Manual control over the guard
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    let mut format: Option<Format> = None;
    let mut basis: Option<Basis> = None;
    let mut top: Option<usize> = None;
    let mut share: Option<u8> = None;

    if !attr.is_empty() {
        let parser = syn::meta::parser(|meta| {
            if meta.path.is_ident("format") {
                let lit: LitStr = meta.value()?.parse()?;
                format = Some(match lit.value().as_str() {
                    "text" => Format::Text,
                    "table" => Format::Table,
                    "json" => Format::Json,
                    "json-pretty" => Format::JsonPretty,
                    other => {
                        return Err(meta.error(format!(
                            "Unknown format {:?}. Expected one of: \"text\", \"table\", \"json\", \"json-pretty\"",
                            other
                        )))
                    }
                });
                return Ok(());
            }

            if meta.path.is_ident("basis") {
                let lit: LitStr = meta.value()?.parse()?;
                basis = Some(match lit.value().as_str() {
                    "all-time" => Basis::AllTime,
                    "live" => Basis::Live,
                    other => {
                        return Err(meta.error(format!(
                            "Unknown basis {:?}. Expected \"all-time\" or \"live\"",
                            other
                        )))
                    }
                });
                return Ok(());
            }

            if meta.path.is_ident("top") {
                let li: LitInt = meta.value()?.parse()?;
                top = Some(li.base10_parse()?);
                return Ok(());
            }

            if meta.path.is_ident("share") {
                let li: LitInt = meta.value()?.parse()?;
                let v: u8 = li.base10_parse()?;
                if v > 100 {
                    return Err(meta.error(format!("Invalid share {} (must be 0..=100)", v)));
                }
                share = Some(v);
                return Ok(());
            }

            Err(meta.error(
                "Unknown parameter. Supported: format=\"..\", basis=\"..\", top=N, share=N",
            ))
        });

        if let Err(e) = parser.parse2(proc_macro2::TokenStream::from(attr)) {
            return e.to_compile_error().into();
        }
    }

    let format_call = format.map(|f| {
        let tokens = f.to_tokens();
        quote!(.format(#tokens))
    });
    let basis_call = basis.map(|b| {
        let tokens = b.to_tokens();
        quote!(.basis(#tokens))
    });
    let limit_call = match (top, share) {
        (Some(n), _) => Some(quote!(.limit(heapguard::Limit::Top(#n)))),
        (None, Some(percent)) => {
            let fraction = f64::from(percent) / 100.0;
            Some(quote!(.limit(heapguard::Limit::Share(#fraction))))
        }
        (None, None) => None,
    };

    let fn_name = &sig.ident;
    let body = quote! {
        let _heapguard = heapguard::GuardBuilder::new(
            concat!(module_path!(), "::", stringify!(#fn_name))
        )
        #format_call
        #basis_call
        #limit_call
        .build();

        #block
    };

    let wrapped_body = if sig.asyncness.is_some() {
        quote! { async { #body }.await }
    } else {
        body
    };

    let output = quote! {
        #vis #sig {
            #wrapped_body
        }
    };

    output.into()
}
