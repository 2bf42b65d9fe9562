use darling::{FromDeriveInput, FromField};
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{DeriveInput, Generics, Ident, Type};

/// Rule names understood by the validator. Anything else is rejected at
/// compile time.
const KNOWN_RULES: &[&str] = &[
    "required",
    "omitempty",
    "oneof",
    "min",
    "max",
    "len",
    "gt",
    "gte",
    "lt",
    "lte",
    "required_unless",
    "required_with",
    "dive",
];

#[derive(Debug, FromDeriveInput)]
#[darling(attributes(config), supports(struct_named))]
struct SettingsOpts {
    ident: Ident,
    generics: Generics,
    data: darling::ast::Data<(), FieldOpts>,
}

#[derive(Debug, FromField)]
#[darling(attributes(config))]
struct FieldOpts {
    ident: Option<Ident>,
    ty: Type,

    /// Path segment of the field within its parent.
    #[darling(default)]
    key: Option<String>,

    /// Default literal, cast like any other value.
    #[darling(default)]
    default: Option<String>,

    /// Comma separated validation rules.
    #[darling(default)]
    validate: Option<String>,

    #[darling(default)]
    nocast: bool,

    #[darling(default)]
    nodecode: bool,

    /// Promote the nested record's fields into this namespace.
    #[darling(default)]
    flatten: bool,
}

pub fn generate_impl(input: &DeriveInput) -> TokenStream2 {
    match SettingsOpts::from_derive_input(input) {
        Ok(opts) => match generate_from_opts(opts) {
            Ok(tokens) => tokens,
            Err(e) => e.write_errors(),
        },
        Err(e) => e.write_errors(),
    }
}

fn generate_from_opts(opts: SettingsOpts) -> darling::Result<TokenStream2> {
    let type_name = &opts.ident;
    let type_name_str = type_name.to_string();
    let (impl_generics, ty_generics, where_clause) = opts.generics.split_for_impl();

    let fields = match opts.data {
        darling::ast::Data::Struct(fields) => fields.fields,
        darling::ast::Data::Enum(_) => {
            return Err(darling::Error::unsupported_shape("enum").with_span(type_name));
        }
    };

    let mut errors = darling::Error::accumulator();
    let mut descriptors = Vec::new();
    let mut reads = Vec::new();
    let mut writes = Vec::new();

    for field in &fields {
        let Some(ident) = &field.ident else {
            continue;
        };

        if let Some(rules) = &field.validate {
            for rule in rules.split(',').map(str::trim).filter(|r| !r.is_empty()) {
                let name = rule.split('=').next().unwrap_or_default();
                if !KNOWN_RULES.contains(&name) {
                    errors.push(
                        darling::Error::custom(format!("unknown validation rule `{name}`"))
                            .with_span(ident),
                    );
                }
            }
        }

        if field.flatten {
            if field.key.is_some() || field.default.is_some() {
                errors.push(
                    darling::Error::custom("`flatten` can not be combined with `key` or `default`")
                        .with_span(ident),
                );
                continue;
            }
            descriptors.push(promoted_descriptor(ident, field));
            reads.push(quote! {
                ::cfgkit::Settings::read_fields(&self.#ident, out);
            });
            writes.push(quote! {
                ::cfgkit::Settings::write_fields(&mut self.#ident, source, ctx)?;
            });
            continue;
        }

        let Some(key) = &field.key else {
            if field.default.is_some() || field.validate.is_some() {
                errors.push(
                    darling::Error::custom("field has settings attributes but no `key`")
                        .with_span(ident),
                );
            }
            continue;
        };

        let nocast = field.nocast;
        let nodecode = field.nodecode;
        descriptors.push(keyed_descriptor(ident, key, field));
        reads.push(quote! {
            out.insert(
                ::std::string::String::from(#key),
                ::cfgkit::Bindable::to_node(&self.#ident),
            );
        });
        writes.push(quote! {
            ::cfgkit::binder::write_field(
                &mut self.#ident,
                source,
                #key,
                ::cfgkit::FieldFlags { nocast: #nocast, nodecode: #nodecode },
                ctx,
            )?;
        });
    }

    errors.finish()?;

    Ok(quote! {
        impl #impl_generics ::cfgkit::Settings for #type_name #ty_generics #where_clause {
            fn descriptor() -> ::cfgkit::StructDescriptor {
                ::cfgkit::StructDescriptor {
                    type_name: #type_name_str,
                    fields: ::std::vec![#(#descriptors),*],
                }
            }

            fn read_fields(&self, out: &mut ::cfgkit::Mapping) {
                #(#reads)*
            }

            fn write_fields(
                &mut self,
                source: &::cfgkit::Mapping,
                ctx: &::cfgkit::BindContext<'_>,
            ) -> ::std::result::Result<(), ::cfgkit::BindError> {
                #(#writes)*
                ::std::result::Result::Ok(())
            }
        }

        impl #impl_generics ::cfgkit::Bindable for #type_name #ty_generics #where_clause {
            fn kind() -> ::cfgkit::Kind {
                ::cfgkit::Kind::Record
            }

            fn type_name() -> &'static str {
                #type_name_str
            }

            fn zero_node() -> ::cfgkit::Node {
                ::cfgkit::binder::record_zero::<Self>()
            }

            fn record_descriptor() -> ::std::option::Option<::cfgkit::StructDescriptor> {
                ::std::option::Option::Some(<Self as ::cfgkit::Settings>::descriptor())
            }

            fn to_node(&self) -> ::cfgkit::Node {
                ::cfgkit::binder::record_to_node(self)
            }

            fn from_node(
                node: ::cfgkit::Node,
                ctx: &::cfgkit::BindContext<'_>,
            ) -> ::std::result::Result<Self, ::cfgkit::BindError> {
                ::cfgkit::binder::record_from_node(node, ctx)
            }

            fn write_node(
                &mut self,
                node: ::cfgkit::Node,
                ctx: &::cfgkit::BindContext<'_>,
            ) -> ::std::result::Result<(), ::cfgkit::BindError> {
                ::cfgkit::binder::record_write_node(self, node, ctx)
            }
        }
    })
}

fn optional_str(value: &Option<String>) -> TokenStream2 {
    match value {
        Some(v) => quote! { ::std::option::Option::Some(#v) },
        None => quote! { ::std::option::Option::None },
    }
}

fn keyed_descriptor(ident: &Ident, key: &str, field: &FieldOpts) -> TokenStream2 {
    let ty = &field.ty;
    let name = ident.to_string();
    let default = optional_str(&field.default);
    let validate = optional_str(&field.validate);
    let nocast = field.nocast;
    let nodecode = field.nodecode;

    quote! {
        ::cfgkit::FieldDescriptor {
            name: #name,
            key: #key,
            default: #default,
            validate: #validate,
            kind: <#ty as ::cfgkit::Bindable>::kind(),
            flags: ::cfgkit::FieldFlags { nocast: #nocast, nodecode: #nodecode },
            type_name: <#ty as ::cfgkit::Bindable>::type_name(),
            fields: <#ty as ::cfgkit::Bindable>::record_descriptor(),
            zero: <#ty as ::cfgkit::Bindable>::zero_node,
            cast_default: ::cfgkit::binder::cast_default::<#ty>,
        }
    }
}

fn promoted_descriptor(ident: &Ident, field: &FieldOpts) -> TokenStream2 {
    let ty = &field.ty;
    let name = ident.to_string();
    let validate = optional_str(&field.validate);

    quote! {
        ::cfgkit::FieldDescriptor {
            name: #name,
            key: "",
            default: ::std::option::Option::None,
            validate: #validate,
            kind: ::cfgkit::Kind::Promoted,
            flags: ::cfgkit::FieldFlags::default(),
            type_name: <#ty as ::cfgkit::Bindable>::type_name(),
            fields: ::std::option::Option::Some(<#ty as ::cfgkit::Settings>::descriptor()),
            zero: <#ty as ::cfgkit::Bindable>::zero_node,
            cast_default: ::cfgkit::binder::cast_default::<#ty>,
        }
    }
}
